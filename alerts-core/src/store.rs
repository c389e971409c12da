//! Access to rule definitions and evaluation history.
//!
//! Persistence belongs to an external relational store; the evaluator only
//! talks to it through [`RuleStore`].

use std::{fmt::Debug, path::Path};

use anyhow::Context;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    error::EvalError,
    model::{EvaluationRecord, Rule},
};

#[async_trait]
pub trait RuleStore: Send + Sync + Debug {
    async fn active_rules(&self) -> Result<Vec<Rule>, EvalError>;

    async fn get_rule(&self, id: &str) -> Result<Option<Rule>, EvalError>;

    /// Appends one history row. Rows are never updated.
    async fn append_record(&self, record: EvaluationRecord) -> Result<(), EvalError>;
}

#[derive(Debug, Default)]
pub struct InMemoryRuleStore {
    rules: RwLock<Vec<Rule>>,
    records: RwLock<Vec<EvaluationRecord>>,
}

impl InMemoryRuleStore {
    pub fn from_rules(rules: Vec<Rule>) -> Self {
        Self { rules: RwLock::new(rules), records: RwLock::default() }
    }

    /// Loads a JSON array of rules, e.g. an export of the rules table.
    pub fn load_json(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read rules file: {}", path.display()))?;
        let rules: Vec<Rule> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse rules file: {}", path.display()))?;

        Ok(Self::from_rules(rules))
    }

    pub async fn records(&self) -> Vec<EvaluationRecord> {
        self.records.read().await.clone()
    }

    pub async fn records_for(&self, rule_id: &str) -> Vec<EvaluationRecord> {
        self.records.read().await.iter().filter(|r| r.rule_id == rule_id).cloned().collect()
    }
}

#[async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn active_rules(&self) -> Result<Vec<Rule>, EvalError> {
        Ok(self.rules.read().await.iter().filter(|r| r.is_active).cloned().collect())
    }

    async fn get_rule(&self, id: &str) -> Result<Option<Rule>, EvalError> {
        Ok(self.rules.read().await.iter().find(|r| r.id == id).cloned())
    }

    async fn append_record(&self, record: EvaluationRecord) -> Result<(), EvalError> {
        self.records.write().await.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Operator;
    use chrono::Utc;
    use std::io::Write;

    fn rule(id: &str, active: bool) -> Rule {
        Rule {
            id: id.into(),
            name: format!("rule {id}"),
            location: "0,0".into(),
            parameter: "humidity".into(),
            operator: Operator::Gte,
            threshold: 90.0,
            unit: "%".into(),
            is_active: active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn only_active_rules_are_listed() {
        let store = InMemoryRuleStore::from_rules(vec![rule("a", true), rule("b", false)]);

        let active = store.active_rules().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "a");
        assert!(store.get_rule("b").await.unwrap().is_some());
        assert!(store.get_rule("c").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn records_are_appended_in_order() {
        let store = InMemoryRuleStore::default();
        for (id, triggered) in [("a", true), ("b", false), ("a", false)] {
            let record = EvaluationRecord {
                rule_id: id.into(),
                is_triggered: triggered,
                observed_value: 1.0,
                threshold_value: 2.0,
                timestamp: Utc::now(),
            };
            store.append_record(record).await.unwrap();
        }

        assert_eq!(store.records().await.len(), 3);
        let history = store.records_for("a").await;
        assert_eq!(history.iter().map(|r| r.is_triggered).collect::<Vec<_>>(), [true, false]);
    }

    #[tokio::test]
    async fn loads_rules_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id":"r1","name":"Windy","location":"london","parameter":"windSpeed","operator":"gt","threshold":12.5,"unit":"m/s"}}]"#
        )
        .unwrap();

        let store = InMemoryRuleStore::load_json(file.path()).unwrap();
        let rules = store.active_rules().await.unwrap();
        assert_eq!(rules[0].parameter, "windSpeed");
        assert_eq!(rules[0].operator, Operator::Gt);
    }
}
