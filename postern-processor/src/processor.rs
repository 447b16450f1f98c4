//! A named chain of matcher/mailet steps

use std::fmt;

use postern_common::{Address, Mail, State, internal};
use postern_tracing::traced;

use crate::{
    MailetError, Matcher, MatcherError, ProcessorError,
    mailet::{Mailet, MailetContext},
};

struct Step {
    matcher: Box<dyn Matcher>,
    mailet: Box<dyn Mailet>,
}

/// Mail produced by one pass of a [`Processor`] besides the mail it was given
#[derive(Debug, Default)]
pub struct Serviced {
    /// Mail split off by partial matches
    pub children: Vec<Mail>,
    /// Split-off mail that failed inside the error processor
    pub failed: Vec<(Mail, ProcessorError)>,
}

/// An ordered chain of (matcher, mailet) steps bound to one state name
pub struct Processor {
    name: State,
    steps: Vec<Step>,
}

impl fmt::Debug for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Processor")
            .field("name", &self.name)
            .field("steps", &self.describe())
            .finish()
    }
}

#[derive(Default)]
struct Worklist {
    /// Split-off mail and the index of the next step it should see
    split: Vec<(Mail, usize)>,
    failed: Vec<(Mail, ProcessorError)>,
}

enum Failure {
    Matcher(MatcherError),
    Mailet(MailetError),
}

impl Processor {
    #[must_use]
    pub fn new(name: impl Into<State>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step
    #[must_use]
    pub fn step(mut self, matcher: impl Matcher + 'static, mailet: impl Mailet + 'static) -> Self {
        self.push(Box::new(matcher), Box::new(mailet));
        self
    }

    pub fn push(&mut self, matcher: Box<dyn Matcher>, mailet: Box<dyn Mailet>) {
        self.steps.push(Step { matcher, mailet });
    }

    pub const fn name(&self) -> &State {
        &self.name
    }

    pub const fn len(&self) -> usize {
        self.steps.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// `matcher -> mailet` for every step, in order
    pub fn describe(&self) -> Vec<String> {
        self.steps
            .iter()
            .map(|step| format!("{} -> {}", step.matcher.name(), step.mailet.info()))
            .collect()
    }

    /// Tear down every mailet in the chain
    pub fn destroy(&self) {
        for step in &self.steps {
            step.mailet.destroy();
        }
    }

    /// Run `mail` through the chain.
    ///
    /// Steps whose matcher selects no recipient are skipped. When every
    /// recipient matches, the mailet services `mail` itself. When only some
    /// match, they are split off into a new mail which the mailet services,
    /// while `mail` keeps the rest and carries on.
    ///
    /// Any mail stops walking the chain once its state no longer names this
    /// processor or it becomes terminal. Split-off mail that finishes the
    /// chain is returned in [`Serviced::children`].
    ///
    /// A failing step records its diagnostic on the mail and moves it to the
    /// error state, even when the mailet had already set that state itself.
    ///
    /// # Errors
    /// If a step fails while this is the error processor
    #[traced(instrument(level = tracing::Level::DEBUG, skip_all, fields(processor = %self.name, id = %mail.id())), timing(precision = "us"))]
    pub async fn service(
        &self,
        mail: &mut Mail,
        ctx: &dyn MailetContext,
    ) -> Result<Serviced, ProcessorError> {
        let mut work = Worklist::default();
        let mut children = Vec::new();

        self.advance(mail, 0, ctx, &mut work).await?;

        while let Some((mut child, next)) = work.split.pop() {
            match self.advance(&mut child, next, ctx, &mut work).await {
                Ok(()) => children.push(child),
                Err(err) => work.failed.push((child, err)),
            }
        }

        Ok(Serviced {
            children,
            failed: work.failed,
        })
    }

    /// Walk `mail` through the steps starting at `start`
    async fn advance(
        &self,
        mail: &mut Mail,
        start: usize,
        ctx: &dyn MailetContext,
        work: &mut Worklist,
    ) -> Result<(), ProcessorError> {
        for (index, step) in self.steps.iter().enumerate().skip(start) {
            if self.has_left(mail) {
                break;
            }

            let matched = match step.matcher.matches(mail) {
                Ok(matched) => narrow(mail.recipients(), matched),
                Err(err) => {
                    self.fail(mail, step, Failure::Matcher(err))?;
                    continue;
                }
            };

            if matched.is_empty() {
                continue;
            }

            if matched.len() == mail.recipients().len() {
                if let Err(err) = service_step(step, mail, ctx).await {
                    self.fail(mail, step, Failure::Mailet(err))?;
                }
                continue;
            }

            let mut child = mail.split(&matched);
            internal!(
                level = DEBUG,
                "Split {} recipient(s) of mail {} into {} for {}",
                child.recipients().len(),
                mail.id(),
                child.id(),
                step.mailet.info()
            );

            let serviced = match service_step(step, &mut child, ctx).await {
                Ok(()) => Ok(()),
                Err(err) => self.fail(&mut child, step, Failure::Mailet(err)),
            };

            match serviced {
                Ok(()) => work.split.push((child, index + 1)),
                Err(err) => work.failed.push((child, err)),
            }
        }

        Ok(())
    }

    fn has_left(&self, mail: &Mail) -> bool {
        mail.is_terminal() || *mail.state() != self.name
    }

    /// Record a failed step on `mail`
    ///
    /// Failures inside the error processor are not retried; they are
    /// returned for the router to escalate, whatever state the mailet left.
    fn fail(&self, mail: &mut Mail, step: &Step, failure: Failure) -> Result<(), ProcessorError> {
        let err = match failure {
            Failure::Matcher(source) => ProcessorError::Matcher {
                processor: self.name.to_string(),
                matcher: step.matcher.name().to_string(),
                source,
            },
            Failure::Mailet(source) => ProcessorError::Mailet {
                processor: self.name.to_string(),
                mailet: step.mailet.info().to_string(),
                source,
            },
        };

        mail.set_error_message(err.to_string());

        if self.name.is_error() {
            return Err(err);
        }

        internal!(level = WARN, "Mail {} moved to error: {err}", mail.id());
        mail.set_state(State::error());
        Ok(())
    }
}

/// Run one mailet, refusing any result that widened the recipient set
async fn service_step(
    step: &Step,
    mail: &mut Mail,
    ctx: &dyn MailetContext,
) -> Result<(), MailetError> {
    let given = mail.recipients().to_vec();

    step.mailet.service(mail, ctx).await?;

    let added: Vec<String> = mail
        .recipients()
        .iter()
        .filter(|rcpt| !given.contains(rcpt))
        .map(ToString::to_string)
        .collect();

    if added.is_empty() {
        Ok(())
    } else {
        mail.set_recipients(given);
        Err(MailetError::WidenedRecipients(added.join(", ")))
    }
}

/// Keep only the matched addresses that really are recipients, once each
fn narrow(recipients: &[Address], mut matched: Vec<Address>) -> Vec<Address> {
    let mut seen = Vec::with_capacity(matched.len());
    matched.retain(|addr| {
        if recipients.contains(addr) && !seen.contains(addr) {
            seen.push(addr.clone());
            true
        } else {
            false
        }
    });
    matched
}
