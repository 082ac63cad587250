//! `RuleEngine` — condition/action evaluation over events (spec §4.5).

use std::collections::HashMap;
use std::time::Instant;

use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;

use crate::error::{EngineError, EngineResult};
use crate::events::{EngineEvent, EventBus};
use crate::model::{Action, ActionOutcome, Condition, ConditionOperator, Rule, RuleExecutionResult};

/// Per-rule lifecycle state (spec §4.5). `Executing` is only observed
/// transiently while `process_event` runs that rule's actions — this
/// process is single-threaded (spec §5), so no other call can observe it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleState {
    Disabled,
    Enabled,
    Executing,
}

/// Dispatches one action by `action_type`. The built-in engine ships no
/// domain-specific handlers — callers register what their rules need via
/// [`RuleEngine::register_action`]; an unregistered `action_type` is logged
/// and reported as a successful no-op rather than failing the rule.
pub trait ActionExecutor: Send + Sync {
    fn execute(&self, action: &Action, event: &Value, context: &Value) -> Result<(), String>;
}

pub struct RuleEngine {
    rules: IndexMap<String, Rule>,
    states: HashMap<String, RuleState>,
    actions: HashMap<String, Box<dyn ActionExecutor>>,
    running: bool,
    events: EventBus,
    /// Lazily-built cache of compiled `matches` patterns, keyed by pattern
    /// text so identical patterns across rules/conditions share one
    /// compile. `None` caches a pattern that failed to compile, so a bad
    /// pattern is only ever attempted once.
    regex_cache: HashMap<String, Option<Regex>>,
}

impl RuleEngine {
    pub fn new(events: EventBus) -> Self {
        Self {
            rules: IndexMap::new(),
            states: HashMap::new(),
            actions: HashMap::new(),
            running: false,
            events,
            regex_cache: HashMap::new(),
        }
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn register_action(&mut self, action_type: impl Into<String>, executor: Box<dyn ActionExecutor>) {
        self.actions.insert(action_type.into(), executor);
    }

    pub fn add_rule(&mut self, rule: Rule) -> EngineResult<()> {
        if self.rules.contains_key(&rule.id) {
            return Err(EngineError::DuplicateId(rule.id.clone()));
        }
        let state = if rule.enabled { RuleState::Enabled } else { RuleState::Disabled };
        self.states.insert(rule.id.clone(), state);
        self.rules.insert(rule.id.clone(), rule);
        Ok(())
    }

    pub fn remove_rule(&mut self, id: &str) -> bool {
        self.states.remove(id);
        self.rules.shift_remove(id).is_some()
    }

    pub fn enable_rule(&mut self, id: &str) -> EngineResult<()> {
        self.set_enabled(id, true)
    }

    pub fn disable_rule(&mut self, id: &str) -> EngineResult<()> {
        self.set_enabled(id, false)
    }

    fn set_enabled(&mut self, id: &str, enabled: bool) -> EngineResult<()> {
        let rule = self
            .rules
            .get_mut(id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        rule.enabled = enabled;
        self.states
            .insert(id.to_string(), if enabled { RuleState::Enabled } else { RuleState::Disabled });
        Ok(())
    }

    pub fn rule_state(&self, id: &str) -> Option<RuleState> {
        self.states.get(id).copied()
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.values()
    }

    /// Evaluates every enabled rule (descending priority, ties keep
    /// insertion order) against `event`/`context`; runs matching rules'
    /// actions sequentially. A per-rule failure is surfaced in that rule's
    /// result and does not abort evaluation of the remaining rules (spec
    /// §4.5).
    pub fn process_event(&mut self, event: &Value, context: &Value) -> Vec<RuleExecutionResult> {
        if !self.running {
            return Vec::new();
        }

        let mut order: Vec<String> = self
            .rules
            .values()
            .filter(|r| r.enabled)
            .map(|r| r.id.clone())
            .collect();
        order.sort_by_key(|id| std::cmp::Reverse(self.rules.get(id).map(|r| r.priority).unwrap_or(0)));

        let mut results = Vec::with_capacity(order.len());
        for id in order {
            let Some(rule) = self.rules.get(&id).cloned() else { continue };
            if !evaluate_conditions(&rule.conditions, event, context, &mut self.regex_cache) {
                continue;
            }

            self.states.insert(id.clone(), RuleState::Executing);
            let mut outcomes = Vec::with_capacity(rule.actions.len());
            let mut rule_success = true;
            for action in &rule.actions {
                let started = Instant::now();
                let outcome = match self.run_action(action, event, context) {
                    Ok(()) => ActionOutcome {
                        action_type: action.action_type.clone(),
                        execution_time_ms: started.elapsed().as_millis() as u64,
                        success: true,
                        error: None,
                    },
                    Err(message) => {
                        rule_success = false;
                        self.events.publish(EngineEvent::ExecutionError {
                            rule_id: id.clone(),
                            message: message.clone(),
                        });
                        ActionOutcome {
                            action_type: action.action_type.clone(),
                            execution_time_ms: started.elapsed().as_millis() as u64,
                            success: false,
                            error: Some(message),
                        }
                    }
                };
                outcomes.push(outcome);
            }
            self.states.insert(id.clone(), RuleState::Enabled);

            let result = RuleExecutionResult {
                rule_id: id,
                success: rule_success,
                actions: outcomes,
            };
            self.events.publish(EngineEvent::RuleExecuted {
                result: Box::new(result.clone()),
            });
            results.push(result);
        }
        results
    }

    fn run_action(&self, action: &Action, event: &Value, context: &Value) -> Result<(), String> {
        match self.actions.get(&action.action_type) {
            Some(executor) => executor.execute(action, event, context),
            None => {
                tracing::debug!(action_type = %action.action_type, "no handler registered; treating as no-op");
                Ok(())
            }
        }
    }
}

fn resolve_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

fn resolve_field<'a>(field: &str, event: &'a Value, context: &'a Value) -> Option<&'a Value> {
    if let Some(rest) = field.strip_prefix("event.") {
        return resolve_path(event, rest);
    }
    if let Some(rest) = field.strip_prefix("context.") {
        return resolve_path(context, rest);
    }
    resolve_path(event, field).or_else(|| resolve_path(context, field))
}

fn evaluate_conditions(
    conditions: &[Condition],
    event: &Value,
    context: &Value,
    regex_cache: &mut HashMap<String, Option<Regex>>,
) -> bool {
    conditions
        .iter()
        .all(|c| evaluate_condition(c, event, context, regex_cache))
}

fn evaluate_condition(
    condition: &Condition,
    event: &Value,
    context: &Value,
    regex_cache: &mut HashMap<String, Option<Regex>>,
) -> bool {
    let actual = resolve_field(&condition.field, event, context);

    match condition.operator {
        ConditionOperator::Eq => actual == Some(&condition.value),
        ConditionOperator::Neq => actual != Some(&condition.value),
        ConditionOperator::Gt => compare_numeric(actual, &condition.value, |a, b| a > b),
        ConditionOperator::Gte => compare_numeric(actual, &condition.value, |a, b| a >= b),
        ConditionOperator::Lt => compare_numeric(actual, &condition.value, |a, b| a < b),
        ConditionOperator::Lte => compare_numeric(actual, &condition.value, |a, b| a <= b),
        ConditionOperator::In => match (actual, condition.value.as_array()) {
            (Some(actual), Some(list)) => list.contains(actual),
            _ => false,
        },
        ConditionOperator::Contains => match actual {
            Some(Value::String(s)) => condition
                .value
                .as_str()
                .is_some_and(|needle| s.contains(needle)),
            Some(Value::Array(items)) => items.contains(&condition.value),
            _ => false,
        },
        ConditionOperator::Matches => match (actual.and_then(Value::as_str), condition.value.as_str()) {
            (Some(text), Some(pattern)) => {
                let compiled = regex_cache
                    .entry(pattern.to_string())
                    .or_insert_with(|| Regex::new(pattern).ok());
                compiled.as_ref().is_some_and(|re| re.is_match(text))
            }
            _ => false,
        },
    }
}

fn compare_numeric(actual: Option<&Value>, expected: &Value, op: impl Fn(f64, f64) -> bool) -> bool {
    match (actual.and_then(Value::as_f64), expected.as_f64()) {
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule(id: &str, priority: i32, field: &str, op: ConditionOperator, value: Value) -> Rule {
        Rule {
            id: id.to_string(),
            name: id.to_string(),
            category: "test".to_string(),
            priority,
            enabled: true,
            conditions: vec![Condition {
                field: field.to_string(),
                operator: op,
                value,
            }],
            actions: vec![Action {
                action_type: "noop".to_string(),
                params: Value::Null,
            }],
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn disabled_engine_processes_nothing() {
        let mut engine = RuleEngine::new(EventBus::default());
        engine
            .add_rule(rule("r1", 1, "event.kind", ConditionOperator::Eq, json!("memoryStored")))
            .unwrap();
        let results = engine.process_event(&json!({"kind": "memoryStored"}), &json!({}));
        assert!(results.is_empty());
    }

    #[test]
    fn matching_rule_fires_in_priority_order() {
        let mut engine = RuleEngine::new(EventBus::default());
        engine.start();
        engine
            .add_rule(rule("low", 1, "event.kind", ConditionOperator::Eq, json!("x")))
            .unwrap();
        engine
            .add_rule(rule("high", 10, "event.kind", ConditionOperator::Eq, json!("x")))
            .unwrap();
        let results = engine.process_event(&json!({"kind": "x"}), &json!({}));
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].rule_id, "high");
        assert_eq!(results[1].rule_id, "low");
        assert!(results.iter().all(|r| r.success));
    }

    #[test]
    fn unmatching_condition_skips_rule() {
        let mut engine = RuleEngine::new(EventBus::default());
        engine.start();
        engine
            .add_rule(rule("r1", 1, "event.kind", ConditionOperator::Eq, json!("other")))
            .unwrap();
        let results = engine.process_event(&json!({"kind": "x"}), &json!({}));
        assert!(results.is_empty());
    }

    #[test]
    fn matches_operator_runs_regex() {
        let mut engine = RuleEngine::new(EventBus::default());
        engine.start();
        engine
            .add_rule(rule(
                "r1",
                1,
                "event.message",
                ConditionOperator::Matches,
                json!("^hello.*"),
            ))
            .unwrap();
        let results = engine.process_event(&json!({"message": "hello world"}), &json!({}));
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn matches_operator_caches_compiled_pattern() {
        let mut engine = RuleEngine::new(EventBus::default());
        engine.start();
        engine
            .add_rule(rule(
                "r1",
                1,
                "event.message",
                ConditionOperator::Matches,
                json!("^hello.*"),
            ))
            .unwrap();
        engine.process_event(&json!({"message": "hello world"}), &json!({}));
        engine.process_event(&json!({"message": "hello again"}), &json!({}));
        assert_eq!(engine.regex_cache.len(), 1);
    }

    #[test]
    fn matches_operator_caches_invalid_pattern_as_non_matching() {
        let mut engine = RuleEngine::new(EventBus::default());
        engine.start();
        engine
            .add_rule(rule(
                "r1",
                1,
                "event.message",
                ConditionOperator::Matches,
                json!("(unclosed"),
            ))
            .unwrap();
        let results = engine.process_event(&json!({"message": "anything"}), &json!({}));
        assert!(results.is_empty());
        assert_eq!(engine.regex_cache.get("(unclosed"), Some(&None));
    }

    struct FailingExecutor;
    impl ActionExecutor for FailingExecutor {
        fn execute(&self, _action: &Action, _event: &Value, _context: &Value) -> Result<(), String> {
            Err("boom".to_string())
        }
    }

    #[test]
    fn action_error_does_not_abort_remaining_rules() {
        let mut engine = RuleEngine::new(EventBus::default());
        engine.start();
        engine.register_action("noop", Box::new(FailingExecutor));
        engine
            .add_rule(rule("r1", 1, "event.kind", ConditionOperator::Eq, json!("x")))
            .unwrap();
        engine
            .add_rule(rule("r2", 1, "event.kind", ConditionOperator::Eq, json!("x")))
            .unwrap();
        let results = engine.process_event(&json!({"kind": "x"}), &json!({}));
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| !r.success));
        assert_eq!(engine.rule_state("r1"), Some(RuleState::Enabled));
    }
}
