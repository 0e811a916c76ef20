// src/refine/prompt.rs
//! External one-shot prompt template for the refiner.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context};
use serde::{Deserialize, Serialize};

use crate::news::NewsItem;

const DEFAULT_TEMPLATE: &str = include_str!("../../config/refiner_prompt.toml");

const ESTIMATE_SLOT: &str = "{initial_estimate}";
const NEWS_SLOT: &str = "{news}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromptTemplate {
    pub instruction: String,
    #[serde(default)]
    pub seed: Vec<ChatTurn>,
}

impl PromptTemplate {
    /// Template compiled into the binary.
    pub fn builtin() -> anyhow::Result<Self> {
        Self::from_toml_str(DEFAULT_TEMPLATE).context("parsing built-in refiner prompt")
    }

    /// Load from `path` when given, the built-in template otherwise.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let s = fs::read_to_string(p)
                    .with_context(|| format!("reading refiner prompt from {}", p.display()))?;
                Self::from_toml_str(&s)
                    .with_context(|| format!("parsing refiner prompt at {}", p.display()))
            }
            None => Self::builtin(),
        }
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let t: PromptTemplate = toml::from_str(s)?;
        t.validate()?;
        Ok(t)
    }

    fn validate(&self) -> anyhow::Result<()> {
        for slot in [ESTIMATE_SLOT, NEWS_SLOT] {
            if !self.instruction.contains(slot) {
                bail!("instruction is missing the {slot} placeholder");
            }
        }
        // seed must alternate user/model and hand the floor back to the user
        for (i, turn) in self.seed.iter().enumerate() {
            let expected = if i % 2 == 0 { Role::User } else { Role::Model };
            if turn.role != expected {
                return Err(anyhow!("seed turn {i} should be {expected:?}"));
            }
        }
        if self.seed.len() % 2 != 0 {
            bail!("seed must end with a model turn");
        }
        Ok(())
    }

    /// The model turn of the worked example, if any.
    pub fn seed_answer(&self) -> Option<&str> {
        self.seed
            .iter()
            .rev()
            .find(|t| t.role == Role::Model)
            .map(|t| t.text.as_str())
    }

    pub fn render_instruction(&self, initial_estimate: f64, news: &[NewsItem]) -> String {
        self.instruction
            .replace(ESTIMATE_SLOT, &initial_estimate.to_string())
            .replace(NEWS_SLOT, &render_news(news))
    }

    /// Seed turns followed by the rendered instruction.
    pub fn conversation(&self, initial_estimate: f64, news: &[NewsItem]) -> Vec<ChatTurn> {
        let mut turns = self.seed.clone();
        turns.push(ChatTurn {
            role: Role::User,
            text: self.render_instruction(initial_estimate, news),
        });
        turns
    }
}

/// One line per article, the way the prompt expects them.
pub fn render_news(news: &[NewsItem]) -> String {
    if news.is_empty() {
        return "(no related news articles found)".to_string();
    }
    news.iter()
        .map(|n| {
            format!(
                "- Title: {}, Publisher: {}, Summary: {}",
                n.title, n.publisher, n.summary
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_template_is_valid_one_shot() {
        let t = PromptTemplate::builtin().unwrap();
        assert_eq!(t.seed.len(), 2);
        assert_eq!(t.seed[0].role, Role::User);
        assert!(t.seed_answer().unwrap().contains("\"cache_recommendation\": true"));
    }

    #[test]
    fn conversation_ends_with_rendered_instruction() {
        let t = PromptTemplate::builtin().unwrap();
        let news = vec![NewsItem {
            title: "Star Wars breaks records".into(),
            publisher: "Deadline".into(),
            summary: "Opening weekend".into(),
        }];
        let conv = t.conversation(1234.5, &news);
        assert_eq!(conv.len(), 3);
        let last = conv.last().unwrap();
        assert_eq!(last.role, Role::User);
        assert!(last.text.contains("Initial predicted views (ARIMA model): 1234.5."));
        assert!(last
            .text
            .contains("- Title: Star Wars breaks records, Publisher: Deadline, Summary: Opening weekend"));
        assert!(!last.text.contains("{news}"));
    }

    #[test]
    fn empty_news_is_rendered_explicitly() {
        assert_eq!(render_news(&[]), "(no related news articles found)");
    }

    #[test]
    fn template_without_placeholders_is_rejected() {
        let err = PromptTemplate::from_toml_str("instruction = \"just answer\"").unwrap_err();
        assert!(err.to_string().contains("{initial_estimate}"));
    }

    #[test]
    fn seed_must_alternate_and_end_with_model() {
        let bad = r#"
            instruction = "{initial_estimate} {news}"
            [[seed]]
            role = "user"
            text = "hi"
        "#;
        assert!(PromptTemplate::from_toml_str(bad).is_err());

        let swapped = r#"
            instruction = "{initial_estimate} {news}"
            [[seed]]
            role = "model"
            text = "a"
            [[seed]]
            role = "user"
            text = "b"
        "#;
        assert!(PromptTemplate::from_toml_str(swapped).is_err());
    }
}
