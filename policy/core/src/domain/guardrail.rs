// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Guardrail Engine
//!
//! Content guardrails (regex, keyword and builtin PII detection) defined per tenancy
//! level and enforced on message text in either direction.
//!
//! ## Merge Rule
//!
//! Unlike settings, guardrails merge as a **union of restrictions**: every enabled
//! rule of every level in the chain is active at once. A lower level can add rules
//! but has no way to switch off one enabled above it. A builtin PII type that a level
//! does not mention is "not configured" there; a type configured nowhere is off.
//!
//! ## Evaluation
//!
//! Each call scans the full text with every active rule, in (level, rule id) order,
//! and ends in one of three states:
//!
//! | Status | Condition | Text |
//! |--------|-----------|------|
//! | `Clean` | no Block or Redact match (Warn matches are still reported) | unchanged |
//! | `Redacted` | one or more Redact matches, no Block match | spans replaced |
//! | `Blocked` | at least one Block match | unchanged |
//!
//! All matches are reported in every state so callers get the complete violation
//! list for audit.
//!
//! Rule patterns are compiled when a rule is defined ([`GuardrailRuleSet::validate`],
//! [`test_guardrails`]) so broken rules are rejected before they can reach evaluation.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

use super::merge::LevelChain;
use super::scope::SettingsLevel;

/// Replacement used by custom Redact rules that do not configure one.
pub const DEFAULT_REPLACEMENT: &str = "[REDACTED]";

/// Id prefix of builtin PII rules; custom rules may not use it.
pub const BUILTIN_RULE_PREFIX: &str = "pii:";

const MAX_PATTERN_SIZE: usize = 1 << 20;

/// Direction of the message being screened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which directions a rule screens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppliesTo {
    Input,
    Output,
    #[default]
    Both,
}

impl AppliesTo {
    pub fn covers(&self, direction: Direction) -> bool {
        matches!(
            (self, direction),
            (AppliesTo::Both, _) | (AppliesTo::Input, Direction::Input) | (AppliesTo::Output, Direction::Output)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardrailAction {
    Block,
    Redact,
    Warn,
}

/// Fixed catalog of builtin PII detectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiType {
    Email,
    Phone,
    Ssn,
    CreditCard,
    IpAddress,
}

impl PiiType {
    pub const ALL: [PiiType; 5] = [
        PiiType::Email,
        PiiType::Phone,
        PiiType::Ssn,
        PiiType::CreditCard,
        PiiType::IpAddress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PiiType::Email => "email",
            PiiType::Phone => "phone",
            PiiType::Ssn => "ssn",
            PiiType::CreditCard => "credit_card",
            PiiType::IpAddress => "ip_address",
        }
    }

    /// Rule id under which matches of this type are reported.
    pub fn rule_id(&self) -> String {
        format!("{}{}", BUILTIN_RULE_PREFIX, self.as_str())
    }

    pub fn default_replacement(&self) -> &'static str {
        match self {
            PiiType::Email => "[REDACTED_EMAIL]",
            PiiType::Phone => "[REDACTED_PHONE]",
            PiiType::Ssn => "[REDACTED_SSN]",
            PiiType::CreditCard => "[REDACTED_CREDIT_CARD]",
            PiiType::IpAddress => "[REDACTED_IP]",
        }
    }

    fn pattern(&self) -> &'static str {
        match self {
            PiiType::Email => r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
            PiiType::Phone => r"(?:\+?1[-.\s]?)?(?:\(\d{3}\)\s?|\b\d{3}[-.\s]?)\d{3}[-.\s]?\d{4}\b",
            PiiType::Ssn => r"\b\d{3}-\d{2}-\d{4}\b",
            PiiType::CreditCard => r"\b(?:\d[ -]?){12,18}\d\b",
            PiiType::IpAddress => {
                r"\b(?:(?:25[0-5]|2[0-4]\d|1?\d?\d)\.){3}(?:25[0-5]|2[0-4]\d|1?\d?\d)\b"
            }
        }
    }
}

impl fmt::Display for PiiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pattern flavour of a custom rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    Regex,
    /// Case-insensitive literal, matched on word boundaries where the keyword
    /// starts or ends with a word character.
    Keyword,
}

/// Kind of rule a match came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Regex,
    Keyword,
    BuiltinPii(PiiType),
}

fn default_true() -> bool {
    true
}

fn default_pii_action() -> GuardrailAction {
    GuardrailAction::Redact
}

/// Custom detection rule defined at one level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRule {
    pub id: String,
    pub kind: PatternKind,
    pub pattern: String,
    pub action: GuardrailAction,
    /// Replacement token for Redact; defaults to [`DEFAULT_REPLACEMENT`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
    #[serde(default)]
    pub applies_to: AppliesTo,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl PatternRule {
    /// Compile the rule's pattern.
    ///
    /// # Errors
    ///
    /// `EmptyRuleId`, `ReservedRuleId`, `EmptyPattern` or `InvalidRegex`.
    pub fn compile(&self) -> Result<Regex, RulePatternError> {
        if self.id.trim().is_empty() {
            return Err(RulePatternError::EmptyRuleId);
        }
        if self.id.starts_with(BUILTIN_RULE_PREFIX) {
            return Err(RulePatternError::ReservedRuleId { rule_id: self.id.clone() });
        }
        if self.pattern.is_empty() || (self.kind == PatternKind::Keyword && self.pattern.trim().is_empty()) {
            return Err(RulePatternError::EmptyPattern { rule_id: self.id.clone() });
        }
        if let Some(replacement) = &self.replacement {
            if replacement.is_empty() {
                return Err(RulePatternError::EmptyReplacement { rule_id: self.id.clone() });
            }
        }

        let source = match self.kind {
            PatternKind::Regex => self.pattern.clone(),
            PatternKind::Keyword => keyword_pattern(self.pattern.trim()),
        };
        build_regex(&self.id, &source, self.kind == PatternKind::Keyword)
    }
}

fn keyword_pattern(keyword: &str) -> String {
    let is_word = |c: Option<char>| c.is_some_and(|c| c.is_alphanumeric() || c == '_');
    let leading = if is_word(keyword.chars().next()) { r"\b" } else { "" };
    let trailing = if is_word(keyword.chars().last()) { r"\b" } else { "" };
    format!("{}{}{}", leading, regex::escape(keyword), trailing)
}

fn build_regex(rule_id: &str, source: &str, case_insensitive: bool) -> Result<Regex, RulePatternError> {
    RegexBuilder::new(source)
        .case_insensitive(case_insensitive)
        .size_limit(MAX_PATTERN_SIZE)
        .build()
        .map_err(|e| RulePatternError::InvalidRegex {
            rule_id: rule_id.to_string(),
            message: e.to_string(),
        })
}

/// Per-level configuration of one builtin PII type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PiiSetting {
    pub enabled: bool,
    #[serde(default = "default_pii_action")]
    pub action: GuardrailAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
    #[serde(default)]
    pub applies_to: AppliesTo,
}

impl PiiSetting {
    pub fn enabled(action: GuardrailAction) -> Self {
        Self {
            enabled: true,
            action,
            replacement: None,
            applies_to: AppliesTo::Both,
        }
    }
}

/// Guardrail definitions owned by one level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailRuleSet {
    #[serde(default)]
    pub rules: Vec<PatternRule>,
    #[serde(default)]
    pub builtin_pii: BTreeMap<PiiType, PiiSetting>,
}

impl GuardrailRuleSet {
    /// Check every rule compiles and rule ids are unique within the set.
    pub fn validate(&self) -> Result<(), RulePatternError> {
        let mut seen = BTreeSet::new();
        for rule in &self.rules {
            rule.compile()?;
            if !seen.insert(rule.id.as_str()) {
                return Err(RulePatternError::DuplicateRuleId { rule_id: rule.id.clone() });
            }
        }
        for (pii_type, setting) in &self.builtin_pii {
            if let Some(replacement) = &setting.replacement {
                if replacement.is_empty() {
                    return Err(RulePatternError::EmptyReplacement { rule_id: pii_type.rule_id() });
                }
            }
        }
        Ok(())
    }

    pub fn contains_rule(&self, rule_id: &str) -> bool {
        self.rules.iter().any(|r| r.id == rule_id)
    }
}

/// Malformed guardrail rule; fatal at definition time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RulePatternError {
    #[error("guardrail rule id cannot be empty")]
    EmptyRuleId,

    #[error("guardrail rule id '{rule_id}' uses the reserved '{prefix}' prefix", prefix = BUILTIN_RULE_PREFIX)]
    ReservedRuleId { rule_id: String },

    #[error("guardrail rule '{rule_id}' has an empty pattern")]
    EmptyPattern { rule_id: String },

    #[error("guardrail rule '{rule_id}' has an empty replacement token")]
    EmptyReplacement { rule_id: String },

    #[error("guardrail rule '{rule_id}' does not compile: {message}")]
    InvalidRegex { rule_id: String, message: String },

    #[error("guardrail rule id '{rule_id}' is defined twice")]
    DuplicateRuleId { rule_id: String },
}

/// Final state of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardrailStatus {
    Clean,
    Redacted,
    Blocked,
}

impl GuardrailStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardrailStatus::Clean => "clean",
            GuardrailStatus::Redacted => "redacted",
            GuardrailStatus::Blocked => "blocked",
        }
    }
}

/// A single rule hit. Spans are byte offsets into the scanned text; the matched
/// text itself is never copied into the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailMatch {
    pub rule_id: String,
    pub level: SettingsLevel,
    pub kind: RuleKind,
    pub action: GuardrailAction,
    pub start: usize,
    pub end: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
}

impl GuardrailMatch {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailResult {
    pub direction: Direction,
    pub status: GuardrailStatus,
    pub blocked: bool,
    pub redacted_text: String,
    pub matches: Vec<GuardrailMatch>,
    /// Set when the result was produced without evaluating rules because the
    /// inputs could not be obtained.
    #[serde(default)]
    pub fail_closed: bool,
}

impl GuardrailResult {
    pub fn clean(direction: Direction, text: &str) -> Self {
        Self {
            direction,
            status: GuardrailStatus::Clean,
            blocked: false,
            redacted_text: text.to_string(),
            matches: Vec::new(),
            fail_closed: false,
        }
    }

    /// Blocked result standing in for an evaluation that could not run.
    pub fn fail_closed(direction: Direction) -> Self {
        Self {
            direction,
            status: GuardrailStatus::Blocked,
            blocked: true,
            redacted_text: String::new(),
            matches: Vec::new(),
            fail_closed: true,
        }
    }

    pub fn blocking_matches(&self) -> impl Iterator<Item = &GuardrailMatch> {
        self.matches.iter().filter(|m| m.action == GuardrailAction::Block)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &GuardrailMatch> {
        self.matches.iter().filter(|m| m.action == GuardrailAction::Warn)
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    id: String,
    level: SettingsLevel,
    kind: RuleKind,
    action: GuardrailAction,
    replacement: Option<String>,
    applies_to: AppliesTo,
    regex: Regex,
}

/// Active rules of a whole scope chain, compiled and ordered by (level, rule id).
#[derive(Debug, Clone, Default)]
pub struct CompiledGuardrails {
    rules: Vec<CompiledRule>,
}

impl CompiledGuardrails {
    /// Union the enabled rules of every level and compile them.
    ///
    /// `pii_replacements` overrides the catalog's default replacement tokens; a
    /// level's own `replacement` takes precedence over both.
    pub fn compile(
        rule_sets: &LevelChain<GuardrailRuleSet>,
        pii_replacements: &BTreeMap<PiiType, String>,
    ) -> Result<Self, RulePatternError> {
        let mut rules = Vec::new();

        for (level, set) in rule_sets.iter() {
            let mut level_rules = Vec::new();

            for rule in set.rules.iter().filter(|r| r.enabled) {
                let kind = match rule.kind {
                    PatternKind::Regex => RuleKind::Regex,
                    PatternKind::Keyword => RuleKind::Keyword,
                };
                level_rules.push(CompiledRule {
                    id: rule.id.clone(),
                    level,
                    kind,
                    action: rule.action,
                    replacement: redact_token(rule.action, rule.replacement.as_deref(), DEFAULT_REPLACEMENT),
                    applies_to: rule.applies_to,
                    regex: rule.compile()?,
                });
            }

            for (pii_type, setting) in set.builtin_pii.iter().filter(|(_, s)| s.enabled) {
                let default_token = pii_replacements
                    .get(pii_type)
                    .map(String::as_str)
                    .unwrap_or_else(|| pii_type.default_replacement());
                let id = pii_type.rule_id();
                level_rules.push(CompiledRule {
                    regex: build_regex(&id, pii_type.pattern(), false)?,
                    id,
                    level,
                    kind: RuleKind::BuiltinPii(*pii_type),
                    action: setting.action,
                    replacement: redact_token(setting.action, setting.replacement.as_deref(), default_token),
                    applies_to: setting.applies_to,
                });
            }

            level_rules.sort_by(|a, b| a.id.cmp(&b.id));
            rules.extend(level_rules);
        }

        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Scan `text` with every rule that applies to `direction`.
    pub fn evaluate(&self, text: &str, direction: Direction) -> GuardrailResult {
        if text.is_empty() {
            return GuardrailResult::clean(direction, text);
        }

        let mut matches = Vec::new();
        for rule in self.rules.iter().filter(|r| r.applies_to.covers(direction)) {
            for found in rule.regex.find_iter(text).filter(|m| !m.is_empty()) {
                matches.push(GuardrailMatch {
                    rule_id: rule.id.clone(),
                    level: rule.level,
                    kind: rule.kind,
                    action: rule.action,
                    start: found.start(),
                    end: found.end(),
                    replacement: rule.replacement.clone(),
                });
            }
        }

        let blocked = matches.iter().any(|m| m.action == GuardrailAction::Block);
        let redacts = matches.iter().any(|m| m.action == GuardrailAction::Redact);

        let (status, redacted_text) = if blocked {
            (GuardrailStatus::Blocked, text.to_string())
        } else if redacts {
            (GuardrailStatus::Redacted, self.apply_redactions(text, direction, &matches))
        } else {
            (GuardrailStatus::Clean, text.to_string())
        };

        GuardrailResult {
            direction,
            status,
            blocked,
            redacted_text,
            matches,
            fail_closed: false,
        }
    }

    /// Replace Redact spans with their replacement tokens.
    ///
    /// The longest candidate is substituted first. The regions on either side of
    /// it are then re-scanned with every Redact rule covering `direction` and
    /// resolved the same way, so no byte is substituted twice and text exposed by
    /// a discarded overlapping match is still caught. `matches` seeds the first
    /// pass; non-Redact matches and spans off the character boundaries of `text`
    /// are ignored.
    pub fn apply_redactions(&self, text: &str, direction: Direction, matches: &[GuardrailMatch]) -> String {
        let seeds: Vec<Span<'_>> = matches
            .iter()
            .filter(|m| m.action == GuardrailAction::Redact)
            .filter(|m| !m.is_empty() && m.end <= text.len())
            .filter(|m| text.is_char_boundary(m.start) && text.is_char_boundary(m.end))
            .map(|m| Span {
                start: m.start,
                end: m.end,
                level: m.level,
                rule_id: &m.rule_id,
                replacement: m.replacement.as_deref().unwrap_or(DEFAULT_REPLACEMENT),
            })
            .collect();

        let redact_rules: Vec<&CompiledRule> = self
            .rules
            .iter()
            .filter(|r| r.action == GuardrailAction::Redact && r.applies_to.covers(direction))
            .collect();

        let mut chosen: Vec<Span<'_>> = Vec::new();
        let mut pending = vec![(0, text.len(), seeds)];
        while let Some((lo, hi, mut candidates)) = pending.pop() {
            candidates.retain(|s| s.start >= lo && s.end <= hi);
            let Some(best) = candidates.iter().min_by(|a, b| a.precedence(b)).copied() else {
                continue;
            };
            for (start, end) in [(lo, best.start), (best.end, hi)] {
                if start < end {
                    let mut region = candidates.clone();
                    region.extend(scan_region(&redact_rules, text, start, end));
                    pending.push((start, end, region));
                }
            }
            chosen.push(best);
        }
        chosen.sort_by_key(|s| s.start);

        let mut output = String::with_capacity(text.len());
        let mut cursor = 0;
        for span in chosen {
            output.push_str(&text[cursor..span.start]);
            output.push_str(span.replacement);
            cursor = span.end;
        }
        output.push_str(&text[cursor..]);
        output
    }
}

/// Redaction candidate, borrowed from either a reported match or a rule.
#[derive(Debug, Clone, Copy)]
struct Span<'a> {
    start: usize,
    end: usize,
    level: SettingsLevel,
    rule_id: &'a str,
    replacement: &'a str,
}

impl Span<'_> {
    /// Longest first, then earliest, then (level, rule id).
    fn precedence(&self, other: &Span<'_>) -> std::cmp::Ordering {
        (other.end - other.start)
            .cmp(&(self.end - self.start))
            .then(self.start.cmp(&other.start))
            .then(self.level.cmp(&other.level))
            .then(self.rule_id.cmp(other.rule_id))
    }
}

fn scan_region<'a>(rules: &[&'a CompiledRule], text: &str, start: usize, end: usize) -> Vec<Span<'a>> {
    let region = &text[start..end];
    let mut found = Vec::new();
    for rule in rules {
        for m in rule.regex.find_iter(region).filter(|m| !m.is_empty()) {
            found.push(Span {
                start: start + m.start(),
                end: start + m.end(),
                level: rule.level,
                rule_id: &rule.id,
                replacement: rule.replacement.as_deref().unwrap_or(DEFAULT_REPLACEMENT),
            });
        }
    }
    found
}

fn redact_token(action: GuardrailAction, configured: Option<&str>, fallback: &str) -> Option<String> {
    (action == GuardrailAction::Redact).then(|| configured.unwrap_or(fallback).to_string())
}

/// Validate one level's rule set and dry-run it against `sample`.
///
/// # Errors
///
/// Any [`RulePatternError`] from validation, before anything is evaluated.
pub fn test_guardrails(
    level: SettingsLevel,
    rule_set: &GuardrailRuleSet,
    sample: &str,
    direction: Direction,
    pii_replacements: &BTreeMap<PiiType, String>,
) -> Result<GuardrailResult, RulePatternError> {
    rule_set.validate()?;
    let chain = LevelChain::new().with(level, rule_set.clone());
    let compiled = CompiledGuardrails::compile(&chain, pii_replacements)?;
    Ok(compiled.evaluate(sample, direction))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(id: &str, kind: PatternKind, pattern: &str, action: GuardrailAction) -> PatternRule {
        PatternRule {
            id: id.to_string(),
            kind,
            pattern: pattern.to_string(),
            action,
            replacement: None,
            applies_to: AppliesTo::Both,
            enabled: true,
        }
    }

    fn pii(pii_type: PiiType, action: GuardrailAction) -> GuardrailRuleSet {
        GuardrailRuleSet {
            rules: vec![],
            builtin_pii: [(pii_type, PiiSetting::enabled(action))].into_iter().collect(),
        }
    }

    fn evaluate(chain: &LevelChain<GuardrailRuleSet>, text: &str) -> GuardrailResult {
        CompiledGuardrails::compile(chain, &BTreeMap::new())
            .unwrap()
            .evaluate(text, Direction::Input)
    }

    #[test]
    fn test_user_level_phone_redaction() {
        let chain = LevelChain::new().with(SettingsLevel::User, pii(PiiType::Phone, GuardrailAction::Redact));
        let result = evaluate(&chain, "call me at 555-123-4567");

        assert_eq!(result.status, GuardrailStatus::Redacted);
        assert!(!result.blocked);
        assert_eq!(result.redacted_text, "call me at [REDACTED_PHONE]");
        assert_eq!(result.matches.len(), 1);
        assert_eq!(result.matches[0].kind, RuleKind::BuiltinPii(PiiType::Phone));
        assert_eq!(result.matches[0].level, SettingsLevel::User);
    }

    #[test]
    fn test_empty_text_is_clean() {
        let chain = LevelChain::new().with(
            SettingsLevel::Org,
            GuardrailRuleSet {
                rules: vec![rule("any", PatternKind::Regex, ".*", GuardrailAction::Block)],
                ..Default::default()
            },
        );
        let result = evaluate(&chain, "");
        assert_eq!(result.status, GuardrailStatus::Clean);
        assert!(result.matches.is_empty());
    }

    #[test]
    fn test_block_reports_every_match() {
        let org = GuardrailRuleSet {
            rules: vec![rule("secret", PatternKind::Keyword, "project x", GuardrailAction::Block)],
            ..Default::default()
        };
        let chain = LevelChain::new()
            .with(SettingsLevel::Org, org)
            .with(SettingsLevel::Team, pii(PiiType::Email, GuardrailAction::Redact));

        let text = "Project X details go to bob@example.com";
        let result = evaluate(&chain, text);

        assert_eq!(result.status, GuardrailStatus::Blocked);
        assert!(result.blocked);
        assert_eq!(result.redacted_text, text);
        assert_eq!(result.matches.len(), 2);
        assert_eq!(result.blocking_matches().count(), 1);
    }

    #[test]
    fn test_lower_level_cannot_disable_higher_pii() {
        let mut team = GuardrailRuleSet::default();
        team.builtin_pii.insert(
            PiiType::Ssn,
            PiiSetting { enabled: false, ..PiiSetting::enabled(GuardrailAction::Redact) },
        );
        let chain = LevelChain::new()
            .with(SettingsLevel::Org, pii(PiiType::Ssn, GuardrailAction::Block))
            .with(SettingsLevel::Team, team);

        let result = evaluate(&chain, "ssn 123-45-6789");
        assert!(result.blocked);
        assert_eq!(result.matches[0].level, SettingsLevel::Org);
    }

    #[test]
    fn test_unconfigured_pii_is_off() {
        let result = evaluate(&LevelChain::new(), "mail bob@example.com or 555-123-4567");
        assert_eq!(result.status, GuardrailStatus::Clean);
        assert!(result.matches.is_empty());
    }

    #[test]
    fn test_matches_ordered_by_level_then_rule_id() {
        let org = GuardrailRuleSet {
            rules: vec![
                rule("z-rule", PatternKind::Keyword, "alpha", GuardrailAction::Warn),
                rule("a-rule", PatternKind::Keyword, "beta", GuardrailAction::Warn),
            ],
            ..Default::default()
        };
        let user = GuardrailRuleSet {
            rules: vec![rule("0-rule", PatternKind::Keyword, "alpha", GuardrailAction::Warn)],
            ..Default::default()
        };
        let chain = LevelChain::new().with(SettingsLevel::User, user).with(SettingsLevel::Org, org);

        let result = evaluate(&chain, "alpha beta");
        let order: Vec<_> = result.matches.iter().map(|m| (m.level, m.rule_id.as_str())).collect();
        assert_eq!(
            order,
            vec![
                (SettingsLevel::Org, "a-rule"),
                (SettingsLevel::Org, "z-rule"),
                (SettingsLevel::User, "0-rule"),
            ]
        );
        assert_eq!(result.status, GuardrailStatus::Clean);
        assert_eq!(result.warnings().count(), 3);
    }

    #[test]
    fn test_keyword_respects_word_boundaries() {
        let compiled = rule("kw", PatternKind::Keyword, "ass", GuardrailAction::Block).compile().unwrap();
        assert!(!compiled.is_match("a classic passage"));
        assert!(compiled.is_match("what an ASS"));
    }

    #[test]
    fn test_direction_filtering() {
        let mut output_only = rule("out", PatternKind::Keyword, "internal", GuardrailAction::Block);
        output_only.applies_to = AppliesTo::Output;
        let chain = LevelChain::new().with(
            SettingsLevel::Org,
            GuardrailRuleSet { rules: vec![output_only], ..Default::default() },
        );
        let compiled = CompiledGuardrails::compile(&chain, &BTreeMap::new()).unwrap();

        assert!(!compiled.evaluate("internal memo", Direction::Input).blocked);
        assert!(compiled.evaluate("internal memo", Direction::Output).blocked);
    }

    #[test]
    fn test_overlapping_redactions_longest_first() {
        let matches = vec![
            GuardrailMatch {
                rule_id: "short".into(),
                level: SettingsLevel::Org,
                kind: RuleKind::Regex,
                action: GuardrailAction::Redact,
                start: 4,
                end: 8,
                replacement: Some("<S>".into()),
            },
            GuardrailMatch {
                rule_id: "long".into(),
                level: SettingsLevel::User,
                kind: RuleKind::Regex,
                action: GuardrailAction::Redact,
                start: 0,
                end: 10,
                replacement: Some("<L>".into()),
            },
            GuardrailMatch {
                rule_id: "tail".into(),
                level: SettingsLevel::Team,
                kind: RuleKind::Regex,
                action: GuardrailAction::Redact,
                start: 11,
                end: 14,
                replacement: Some("<T>".into()),
            },
        ];
        let none = CompiledGuardrails::default();
        assert_eq!(none.apply_redactions("0123456789 abc!", Direction::Input, &matches), "<L> <T>!");
    }

    #[test]
    fn test_overlap_remainder_is_rescanned() {
        let mut prefixed = rule("prefixed", PatternKind::Regex, r"AB\d{2}", GuardrailAction::Redact);
        prefixed.replacement = Some("<Y>".into());
        let mut digits = rule("digits", PatternKind::Regex, r"\d{3}", GuardrailAction::Redact);
        digits.replacement = Some("<X>".into());
        let chain = LevelChain::new().with(
            SettingsLevel::Org,
            GuardrailRuleSet { rules: vec![prefixed, digits], ..Default::default() },
        );

        let result = evaluate(&chain, "AB1234567");
        assert_eq!(result.status, GuardrailStatus::Redacted);
        // "123" loses to "AB12"; the leftover "34567" is scanned again
        assert_eq!(result.redacted_text, "<Y><X>67");
    }

    #[test]
    fn test_redaction_is_idempotent_on_output() {
        let chain = LevelChain::new().with(
            SettingsLevel::Org,
            GuardrailRuleSet {
                rules: vec![],
                builtin_pii: PiiType::ALL
                    .into_iter()
                    .map(|t| (t, PiiSetting::enabled(GuardrailAction::Redact)))
                    .collect(),
            },
        );
        let compiled = CompiledGuardrails::compile(&chain, &BTreeMap::new()).unwrap();

        let first = compiled.evaluate("ip 10.0.0.1, mail a@b.io, ssn 123-45-6789", Direction::Input);
        let second = compiled.evaluate(&first.redacted_text, Direction::Input);

        assert!(second.matches.is_empty());
        assert_eq!(
            compiled.apply_redactions(&first.redacted_text, Direction::Input, &second.matches),
            first.redacted_text
        );
    }

    #[test]
    fn test_invalid_rules_fail_eagerly() {
        let broken = GuardrailRuleSet {
            rules: vec![rule("broken", PatternKind::Regex, "(unclosed", GuardrailAction::Block)],
            ..Default::default()
        };
        let result = test_guardrails(SettingsLevel::Team, &broken, "text", Direction::Input, &BTreeMap::new());
        assert!(matches!(result, Err(RulePatternError::InvalidRegex { .. })));

        let duplicate = GuardrailRuleSet {
            rules: vec![
                rule("dup", PatternKind::Keyword, "a", GuardrailAction::Warn),
                rule("dup", PatternKind::Keyword, "b", GuardrailAction::Warn),
            ],
            ..Default::default()
        };
        assert_eq!(
            duplicate.validate(),
            Err(RulePatternError::DuplicateRuleId { rule_id: "dup".into() })
        );

        let empty = rule("empty", PatternKind::Keyword, "   ", GuardrailAction::Warn);
        assert!(matches!(empty.compile(), Err(RulePatternError::EmptyPattern { .. })));
    }

    #[test]
    fn test_builtin_prefix_is_reserved() {
        let mut team = pii(PiiType::Phone, GuardrailAction::Redact);
        team.rules.push(rule("pii:phone", PatternKind::Keyword, "hotline", GuardrailAction::Block));

        assert_eq!(
            team.validate(),
            Err(RulePatternError::ReservedRuleId { rule_id: "pii:phone".into() })
        );
        let chain = LevelChain::new().with(SettingsLevel::Team, team);
        assert!(CompiledGuardrails::compile(&chain, &BTreeMap::new()).is_err());
    }

    #[test]
    fn test_pii_replacement_overrides() {
        let chain = LevelChain::new().with(SettingsLevel::Org, pii(PiiType::Email, GuardrailAction::Redact));
        let overrides = [(PiiType::Email, "<email>".to_string())].into_iter().collect();
        let compiled = CompiledGuardrails::compile(&chain, &overrides).unwrap();

        let result = compiled.evaluate("write to ops@corp.example", Direction::Output);
        assert_eq!(result.redacted_text, "write to <email>");
    }
}
