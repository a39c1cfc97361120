use crate::context::ToolCallContext;
use crate::pipeline::{FilterVerdict, SecurityFilter};
use async_trait::async_trait;
use regex::RegexSet;
use sa_domain::error::Result;

/// Scans the user-authored text behind a tool call for prompt-injection
/// or role-override markers, precompiled once at startup into a single
/// `RegexSet` so a miss costs one pass over the text regardless of how
/// many patterns are configured.
pub struct Sanitizer {
    patterns: RegexSet,
}

impl Sanitizer {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let set = RegexSet::new(patterns)
            .map_err(|e| sa_domain::error::Error::Config(format!("invalid sanitizer pattern: {e}")))?;
        Ok(Self { patterns: set })
    }
}

#[async_trait]
impl SecurityFilter for Sanitizer {
    fn name(&self) -> &'static str {
        "sanitizer"
    }

    async fn check(&self, ctx: &ToolCallContext) -> Result<FilterVerdict> {
        let Some(text) = &ctx.source_text else {
            return Ok(FilterVerdict::Allow);
        };
        if self.patterns.is_match(text) {
            return Ok(FilterVerdict::Block(
                "source text matched a prompt-injection pattern".into(),
            ));
        }
        Ok(FilterVerdict::Allow)
    }
}
