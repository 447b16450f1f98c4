//! Dispatches mail between processors until it is done
//!
//! The router looks up the processor named by a mail's state, runs it, and
//! repeats with whatever state the mail ends up in. Routing a mail stops when
//! it becomes terminal (ghost, or no recipients left) or when a pass leaves
//! its state untouched, in which case the mail is *stalled* and waits in the
//! queue until it is picked up again. Mail split off during a pass that is
//! still in that pass's state is stalled as well; it has already seen the
//! whole chain.
//!
//! Failures escalate in two steps: a mail that fails outside the error
//! processor is sent to it; a mail that fails inside it is ghosted and handed
//! to [`MailetContext::dead_letter`].

use ahash::AHashMap;
use postern_common::{Mail, State, internal, outgoing};
use postern_tracing::traced;

use crate::{ConfigError, Processor, mailet::MailetContext};

/// How routing of one mail ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Ghosted or left without recipients; ready to be disposed
    Terminal,
    /// A processor pass left the state unchanged; the mail stays queued
    Stalled,
}

/// One mail after routing
#[derive(Debug)]
pub struct Routed {
    pub mail: Mail,
    pub outcome: Outcome,
    /// Number of processor passes the mail went through
    pub dispatches: usize,
}

impl Routed {
    pub fn is_terminal(&self) -> bool {
        self.outcome == Outcome::Terminal
    }
}

/// The result of routing a mail and everything split off from it
#[derive(Debug)]
pub struct RouteReport {
    /// The mail that was routed, under its original id
    pub mail: Routed,
    /// Mail split off along the way, each under a new id
    pub children: Vec<Routed>,
}

/// Immutable map from state names to processors
///
/// Built once at startup and shared behind an `Arc`.
#[derive(Debug)]
pub struct ProcessorRouter {
    processors: AHashMap<State, Processor>,
    max_dispatches: Option<usize>,
}

impl ProcessorRouter {
    #[must_use]
    pub fn builder() -> RouterBuilder {
        RouterBuilder::default()
    }

    /// Names of every configured processor, sorted
    pub fn processor_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.processors.keys().map(State::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn processor(&self, name: &str) -> Option<&Processor> {
        self.processors.get(name)
    }

    pub const fn max_dispatches(&self) -> Option<usize> {
        self.max_dispatches
    }

    /// Tear down every processor
    pub fn destroy(&self) {
        for processor in self.processors.values() {
            processor.destroy();
        }
    }

    /// Route `mail`, and everything split off from it, until each is
    /// terminal or stalled.
    #[traced(instrument(level = tracing::Level::DEBUG, skip_all, fields(id = %mail.id())), timing(precision = "us"))]
    pub async fn route(&self, mail: Mail, ctx: &dyn MailetContext) -> RouteReport {
        let mut pending = Vec::new();
        let primary = self.route_one(mail, None, ctx, &mut pending).await;

        let mut children = Vec::new();
        while let Some((child, serviced_in)) = pending.pop() {
            children.push(self.route_one(child, serviced_in, ctx, &mut pending).await);
        }

        RouteReport {
            mail: primary,
            children,
        }
    }

    /// `serviced_in` names the processor a split-off mail already finished
    async fn route_one(
        &self,
        mut mail: Mail,
        serviced_in: Option<State>,
        ctx: &dyn MailetContext,
        spawned: &mut Vec<(Mail, Option<State>)>,
    ) -> Routed {
        let mut dispatches = 0;
        let mut exceeded = false;

        if let Some(state) = serviced_in
            && !mail.is_terminal()
            && *mail.state() == state
        {
            internal!(
                level = DEBUG,
                "Split mail {} stalled in processor {state}",
                mail.id()
            );
            return Routed {
                mail,
                outcome: Outcome::Stalled,
                dispatches,
            };
        }

        loop {
            if mail.is_terminal() {
                return Routed {
                    mail,
                    outcome: Outcome::Terminal,
                    dispatches,
                };
            }

            let state = mail.state().clone();

            let Some(processor) = self.processors.get(&state) else {
                let reason = format!("No processor configured for state '{state}'");
                if state.is_error() {
                    escalate(&mut mail, &reason, ctx).await;
                } else {
                    internal!(level = WARN, "Mail {}: {reason}", mail.id());
                    mail.set_error_message(reason);
                    mail.set_state(State::error());
                }
                continue;
            };

            // Past the ceiling the error processor gets exactly one pass.
            if let Some(max) = self.max_dispatches
                && dispatches >= max.saturating_add(usize::from(exceeded))
            {
                let reason = format!("Exceeded {max} processor dispatches in state '{state}'");
                if exceeded || state.is_error() {
                    escalate(&mut mail, &reason, ctx).await;
                } else {
                    exceeded = true;
                    mail.set_error_message(reason);
                    mail.set_state(State::error());
                }
                continue;
            }

            dispatches += 1;

            match processor.service(&mut mail, ctx).await {
                Ok(serviced) => {
                    spawned.extend(
                        serviced
                            .children
                            .into_iter()
                            .map(|child| (child, Some(state.clone()))),
                    );
                    for (mut child, err) in serviced.failed {
                        escalate(&mut child, &err.to_string(), ctx).await;
                        spawned.push((child, None));
                    }
                }
                Err(err) => {
                    escalate(&mut mail, &err.to_string(), ctx).await;
                    continue;
                }
            }

            if !mail.is_terminal() && *mail.state() == state {
                internal!(
                    level = DEBUG,
                    "Mail {} stalled in processor {state}",
                    mail.id()
                );
                return Routed {
                    mail,
                    outcome: Outcome::Stalled,
                    dispatches,
                };
            }
        }
    }
}

/// Give up on a mail: ghost it and hand it to the dead-letter hook
async fn escalate(mail: &mut Mail, reason: &str, ctx: &dyn MailetContext) {
    outgoing!(
        level = ERROR,
        "Giving up on mail {} in state {}: {reason}",
        mail.id(),
        mail.state()
    );
    mail.set_error_message(reason);
    mail.set_state(State::ghost());
    ctx.dead_letter(mail, reason).await;
}

/// Builder for [`ProcessorRouter`]
#[derive(Debug, Default)]
pub struct RouterBuilder {
    processors: Vec<Processor>,
    max_dispatches: Option<usize>,
}

impl RouterBuilder {
    #[must_use]
    pub fn processor(mut self, processor: Processor) -> Self {
        self.processors.push(processor);
        self
    }

    /// Cap the number of processor passes a mail may take in one routing
    /// before it is treated as failing
    #[must_use]
    pub fn max_dispatches(mut self, max: Option<usize>) -> Self {
        self.max_dispatches = max;
        self
    }

    /// # Errors
    /// If a processor name repeats, a processor is named after the ghost
    /// state, or no error processor is configured
    pub fn build(self) -> Result<ProcessorRouter, ConfigError> {
        let mut processors = AHashMap::with_capacity(self.processors.len());

        for processor in self.processors {
            let name = processor.name().clone();
            if name.is_ghost() {
                return Err(ConfigError::ReservedProcessor(name.to_string()));
            }
            if processors.insert(name.clone(), processor).is_some() {
                return Err(ConfigError::DuplicateProcessor(name.to_string()));
            }
        }

        if !processors.contains_key(State::ERROR) {
            return Err(ConfigError::MissingErrorProcessor(State::ERROR.to_string()));
        }

        let router = ProcessorRouter {
            processors,
            max_dispatches: self.max_dispatches,
        };

        internal!(
            level = INFO,
            "Configured processors: {:?}",
            router.processor_names()
        );

        Ok(router)
    }
}
