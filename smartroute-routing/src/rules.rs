//! Ordered sender/MX rules
//!
//! A rule key is compared against a request in three ways, in this order:
//!
//! 1. the sender address equals the key
//! 2. the key occurs in the MX hostname being tried
//! 3. the key occurs in the sender address
//!
//! Rules are tried in declaration order and the first one that matches in any
//! of the three ways wins. All comparisons ignore case.
//!
//! The key `default` is reserved: it is never matched against a request, and
//! its target is used when nothing else matches.

use std::fmt;

use tracing::warn;

use crate::config::RuleConfig;

pub const DEFAULT_RULE: &str = "default";

/// Rule target meaning "explicitly do not route"
pub const NO_RESULT: &str = "NO RESULT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Answer `NO RESULT` without consulting the scheduler
    NoResult,
    /// Spread the request over the whole fleet
    Everyone,
    /// A group name or a server name
    Named(String),
}

impl Target {
    #[must_use]
    pub fn parse(target: &str) -> Self {
        let target = target.trim();
        if target == NO_RESULT {
            Self::NoResult
        } else if target.is_empty() {
            Self::Everyone
        } else {
            Self::Named(target.to_string())
        }
    }

    /// The group or server this target names, if any
    #[must_use]
    pub fn identifier(&self) -> Option<&str> {
        match self {
            Self::Named(name) => Some(name),
            Self::NoResult | Self::Everyone => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoResult => f.write_str(NO_RESULT),
            Self::Everyone => f.write_str("<all servers>"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// How a rule came to match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Sender,
    MxHost,
    SenderSubstring,
    Default,
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sender => "sender",
            Self::MxHost => "MX hostname",
            Self::SenderSubstring => "sender domain",
            Self::Default => "default",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    key: String,
    target: Target,
}

impl Rule {
    #[must_use]
    pub fn new(key: &str, target: Target) -> Self {
        Self {
            key: key.trim().to_lowercase(),
            target,
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub const fn target(&self) -> &Target {
        &self.target
    }

    /// Both arguments must already be lowercase
    fn test(&self, sender: &str, mx_host: &str) -> Option<MatchKind> {
        if sender == self.key {
            Some(MatchKind::Sender)
        } else if mx_host.contains(self.key.as_str()) {
            Some(MatchKind::MxHost)
        } else if sender.contains(self.key.as_str()) {
            Some(MatchKind::SenderSubstring)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleMatch<'a> {
    pub key: &'a str,
    pub target: &'a Target,
    pub kind: MatchKind,
}

#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: Vec<Rule>,
    default: Option<Target>,
}

impl RuleTable {
    /// Compile the configured rules, keeping their order.
    ///
    /// Empty keys are dropped since they would match every request. Only the
    /// first `default` rule is honoured.
    #[must_use]
    pub fn compile(config: &[RuleConfig]) -> Self {
        let mut table = Self::default();

        for (position, rule) in config.iter().enumerate() {
            let key = rule.key.trim();
            let target = Target::parse(&rule.target);

            if key.eq_ignore_ascii_case(DEFAULT_RULE) {
                if table.default.is_some() {
                    warn!("Ignoring duplicate `{DEFAULT_RULE}` rule -> {target}");
                    continue;
                }
                if position != 0 {
                    warn!("The `{DEFAULT_RULE}` rule should be declared first");
                }
                table.default = Some(target);
            } else if key.is_empty() {
                warn!("Ignoring rule with an empty key -> {target}");
            } else {
                table.rules.push(Rule::new(key, target));
            }
        }

        table
    }

    /// The first rule matching this sender and MX hostname, ignoring the default
    #[must_use]
    pub fn find(&self, sender: &str, mx_host: &str) -> Option<RuleMatch<'_>> {
        let sender = sender.to_lowercase();
        let mx_host = mx_host.to_lowercase();

        self.rules.iter().find_map(|rule| {
            rule.test(&sender, &mx_host).map(|kind| RuleMatch {
                key: rule.key(),
                target: rule.target(),
                kind,
            })
        })
    }

    /// Like [`find`](Self::find), falling back to the default rule
    #[must_use]
    pub fn resolve(&self, sender: &str, mx_host: &str) -> Option<RuleMatch<'_>> {
        self.find(sender, mx_host).or_else(|| self.default_match())
    }

    #[must_use]
    pub fn default_match(&self) -> Option<RuleMatch<'_>> {
        self.default.as_ref().map(|target| RuleMatch {
            key: DEFAULT_RULE,
            target,
            kind: MatchKind::Default,
        })
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
