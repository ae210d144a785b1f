//! Block remapping rules

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Maps one `(id, data)` pair to its replacement.
///
/// Implementations must be total and free of side effects: the repair
/// pass calls this once per non-air block in no particular order.
pub trait BlockFixer: Send + Sync {
    fn fix(&self, id: u16, data: u8) -> (u16, u8);
}

impl<F> BlockFixer for F
where
    F: Fn(u16, u8) -> (u16, u8) + Send + Sync,
{
    fn fix(&self, id: u16, data: u8) -> (u16, u8) {
        self(id, data)
    }
}

/// One remap rule. Missing data fields mean "any" on input and "keep" on output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemapRule {
    pub from: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_data: Option<u8>,
    pub to: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_data: Option<u8>,
}

impl RemapRule {
    /// Rule matching every data value of `from`
    pub fn id(from: u16, to: u16) -> Self {
        Self { from, from_data: None, to, to_data: None }
    }

    /// Rule matching one exact `(id, data)` pair
    pub fn exact(from: (u16, u8), to: (u16, u8)) -> Self {
        Self {
            from: from.0,
            from_data: Some(from.1),
            to: to.0,
            to_data: Some(to.1),
        }
    }
}

/// Lookup table of [`RemapRule`]s.
///
/// An exact `(id, data)` rule beats an id-only rule; unmatched blocks pass
/// through unchanged. Later rules replace earlier ones with the same key.
#[derive(Debug, Clone, Default)]
pub struct RemapTable {
    exact: HashMap<(u16, u8), (u16, Option<u8>)>,
    by_id: HashMap<u16, (u16, Option<u8>)>,
}

impl RemapTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rules<'a>(rules: impl IntoIterator<Item = &'a RemapRule>) -> Self {
        let mut table = Self::new();
        for rule in rules {
            table.insert(*rule);
        }
        table
    }

    pub fn insert(&mut self, rule: RemapRule) {
        let target = (rule.to, rule.to_data);
        match rule.from_data {
            Some(data) => self.exact.insert((rule.from, data & 0x0f), target),
            None => self.by_id.insert(rule.from, target),
        };
    }

    pub fn len(&self) -> usize {
        self.exact.len() + self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlockFixer for RemapTable {
    fn fix(&self, id: u16, data: u8) -> (u16, u8) {
        let target = self
            .exact
            .get(&(id, data))
            .or_else(|| self.by_id.get(&id));

        match target {
            Some(&(to, to_data)) => (to, to_data.unwrap_or(data)),
            None => (id, data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_fixer() {
        let fixer = |id: u16, data: u8| if id == 1 { (2, data) } else { (id, data) };
        assert_eq!(fixer.fix(1, 3), (2, 3));
        assert_eq!(fixer.fix(5, 0), (5, 0));
    }

    #[test]
    fn test_exact_beats_id_rule() {
        let table = RemapTable::from_rules(&[
            RemapRule::id(125, 157),
            RemapRule::exact((125, 8), (157, 0)),
        ]);

        assert_eq!(table.fix(125, 3), (157, 3));
        assert_eq!(table.fix(125, 8), (157, 0));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_unmatched_passes_through() {
        let table = RemapTable::from_rules(&[RemapRule::id(95, 241)]);
        assert_eq!(table.fix(1, 0), (1, 0));
        assert_eq!(table.fix(95, 14), (241, 14));
        assert!(RemapTable::new().is_empty());
    }

    #[test]
    fn test_rule_json_defaults() {
        let rule: RemapRule = serde_json::from_str(r#"{"from": 3, "to": 4}"#).unwrap();
        assert_eq!(rule, RemapRule::id(3, 4));

        let json = serde_json::to_string(&RemapRule::id(3, 4)).unwrap();
        assert_eq!(json, r#"{"from":3,"to":4}"#);
    }
}
