// src/forecast/optimize.rs
//! Derivative-free minimizer used to fit model coefficients.

/// Nelder–Mead simplex minimization of `f` starting at `x0`.
///
/// Returns the best point found and its objective value. Stops after
/// `max_iter` iterations or once the simplex spread falls below `tol`.
pub fn nelder_mead<F>(f: F, x0: &[f64], step: f64, max_iter: usize, tol: f64) -> (Vec<f64>, f64)
where
    F: Fn(&[f64]) -> f64,
{
    let n = x0.len();
    if n == 0 {
        return (Vec::new(), f(x0));
    }

    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    simplex.push(x0.to_vec());
    for i in 0..n {
        let mut v = x0.to_vec();
        v[i] += step;
        simplex.push(v);
    }
    let mut values: Vec<f64> = simplex.iter().map(|v| f(v)).collect();

    for _ in 0..max_iter {
        // order best → worst
        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        simplex = order.iter().map(|&i| simplex[i].clone()).collect();
        values = order.iter().map(|&i| values[i]).collect();

        if (values[n] - values[0]).abs() <= tol * (1.0 + values[0].abs()) {
            break;
        }

        let centroid: Vec<f64> = (0..n)
            .map(|j| simplex[..n].iter().map(|v| v[j]).sum::<f64>() / n as f64)
            .collect();
        let towards = |coef: f64| -> Vec<f64> {
            centroid
                .iter()
                .zip(&simplex[n])
                .map(|(c, w)| c + coef * (w - c))
                .collect()
        };

        let reflected = towards(-1.0);
        let fr = f(&reflected);
        if fr < values[0] {
            let expanded = towards(-2.0);
            let fe = f(&expanded);
            if fe < fr {
                simplex[n] = expanded;
                values[n] = fe;
            } else {
                simplex[n] = reflected;
                values[n] = fr;
            }
            continue;
        }
        if fr < values[n - 1] {
            simplex[n] = reflected;
            values[n] = fr;
            continue;
        }

        let contracted = if fr < values[n] { towards(-0.5) } else { towards(0.5) };
        let fc = f(&contracted);
        if fc < values[n].min(fr) {
            simplex[n] = contracted;
            values[n] = fc;
            continue;
        }

        // shrink towards the best vertex
        let best = simplex[0].clone();
        for i in 1..=n {
            simplex[i] = best
                .iter()
                .zip(&simplex[i])
                .map(|(b, v)| b + 0.5 * (v - b))
                .collect();
            values[i] = f(&simplex[i]);
        }
    }

    let (best_idx, best_val) = values
        .iter()
        .copied()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .unwrap_or((0, f64::INFINITY));
    (simplex.swap_remove(best_idx), best_val)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_minimum_of_shifted_quadratic() {
        let f = |x: &[f64]| (x[0] - 0.3).powi(2) + 2.0 * (x[1] + 0.7).powi(2);
        let (x, fx) = nelder_mead(f, &[0.0, 0.0], 0.5, 2_000, 1e-14);
        assert!((x[0] - 0.3).abs() < 1e-4, "x0 = {}", x[0]);
        assert!((x[1] + 0.7).abs() < 1e-4, "x1 = {}", x[1]);
        assert!(fx < 1e-8);
    }

    #[test]
    fn rosenbrock_converges() {
        let f = |x: &[f64]| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2);
        let (x, _) = nelder_mead(f, &[-1.2, 1.0], 0.5, 10_000, 1e-16);
        assert!((x[0] - 1.0).abs() < 1e-3);
        assert!((x[1] - 1.0).abs() < 1e-3);
    }
}
