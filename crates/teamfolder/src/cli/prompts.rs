//! Terminal prompts and notifications.

use std::io::Write;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::Mutex;

use crate::analyzer::FolderClassification;
use crate::collaborators::{AmbiguousChoice, Decision, Notifier, NotifyLevel, Prompts};
use crate::identity::NewIdentity;

/// Prompts answered on a line-oriented input, stdin by default.
///
/// End of input is treated as the user dismissing the prompt.
pub struct TerminalPrompts<R = BufReader<Stdin>> {
    input: Mutex<R>,
    assume_yes: bool,
    use_as_new: bool,
}

impl<R> std::fmt::Debug for TerminalPrompts<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalPrompts")
            .field("assume_yes", &self.assume_yes)
            .field("use_as_new", &self.use_as_new)
            .finish_non_exhaustive()
    }
}

impl TerminalPrompts {
    /// Prompts reading from stdin.
    #[must_use]
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R> TerminalPrompts<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    /// Prompts reading from `input`.
    #[must_use]
    pub fn new(input: R) -> Self {
        Self {
            input: Mutex::new(input),
            assume_yes: false,
            use_as_new: false,
        }
    }

    /// Confirm joins without asking.
    #[must_use]
    pub fn with_assume_yes(mut self, assume_yes: bool) -> Self {
        self.assume_yes = assume_yes;
        self
    }

    /// Use unrecognized folders as new teams without asking.
    #[must_use]
    pub fn with_use_as_new(mut self, use_as_new: bool) -> Self {
        self.use_as_new = use_as_new;
        self
    }

    /// Print `question` to stderr and read one trimmed line; `None` at end of input.
    async fn ask(&self, question: &str) -> Option<String> {
        eprint!("{question} ");
        let _ = std::io::stderr().flush();

        let mut line = String::new();
        let mut input = self.input.lock().await;
        match input.read_line(&mut line).await {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_string()),
        }
    }

    async fn ask_optional(&self, question: &str) -> Option<Option<String>> {
        let answer = self.ask(question).await?;
        Some((!answer.is_empty()).then_some(answer))
    }

    async fn ask_yes_no(&self, question: &str) -> Option<bool> {
        let answer = self.ask(&format!("{question} [y/N]")).await?;
        Some(matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes"))
    }
}

#[async_trait]
impl<R> Prompts for TerminalPrompts<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn ask_identity(&self) -> Option<NewIdentity> {
        let name = self.ask("Your name:").await?;
        let email = self.ask_optional("Email (optional):").await?;
        let company = self.ask_optional("Company (optional):").await?;
        Some(NewIdentity {
            name,
            email,
            role: None,
            company,
        })
    }

    async fn confirm_join(&self, classification: &FolderClassification) -> Decision {
        let creator = classification
            .creator
            .as_ref()
            .map_or("unknown", |c| c.name.as_str());
        eprintln!(
            "'{}' is a team folder created by {creator} with {} members.",
            classification.folder_name,
            classification.members.len()
        );
        if let Some(last) = classification.last_activity {
            eprintln!("Last activity: {}", last.format("%Y-%m-%d %H:%M UTC"));
        }

        if self.assume_yes {
            return Decision::Confirm;
        }
        match self.ask_yes_no("Join this team?").await {
            Some(true) => Decision::Confirm,
            Some(false) => Decision::Decline,
            None => Decision::Cancel,
        }
    }

    async fn resolve_ambiguous_folder(
        &self,
        classification: &FolderClassification,
    ) -> AmbiguousChoice {
        if self.use_as_new {
            return AmbiguousChoice::UseAsNewTeam;
        }
        let question = format!(
            "Create a new team in '{}' anyway? Existing files are left in place.",
            classification.folder_name
        );
        match self.ask_yes_no(&question).await {
            Some(true) => AmbiguousChoice::UseAsNewTeam,
            _ => AmbiguousChoice::Abort,
        }
    }
}

/// Prints notifications for a terminal user.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn notify(&self, message: &str, level: NotifyLevel) {
        match level {
            NotifyLevel::Info | NotifyLevel::Success => println!("{message}"),
            NotifyLevel::Warning => eprintln!("warning: {message}"),
            NotifyLevel::Error => eprintln!("error: {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::FolderKind;

    fn classification() -> FolderClassification {
        FolderClassification {
            folder_name: "team".to_string(),
            is_empty: false,
            has_roster_data: true,
            has_domain_data: false,
            members: Vec::new(),
            creator: None,
            last_activity: None,
            domain_types: Vec::new(),
            roster_error: None,
            result_type: FolderKind::ExistingTeam,
            roster: None,
        }
    }

    #[tokio::test]
    async fn test_ask_identity_reads_lines() {
        let prompts = TerminalPrompts::new(&b"Ada Lovelace\n\nAnalytical\n"[..]);
        let details = prompts.ask_identity().await.unwrap();

        assert_eq!(details.name, "Ada Lovelace");
        assert!(details.email.is_none());
        assert_eq!(details.company.as_deref(), Some("Analytical"));
    }

    #[tokio::test]
    async fn test_ask_identity_eof_cancels() {
        let prompts = TerminalPrompts::new(&b""[..]);
        assert!(prompts.ask_identity().await.is_none());
    }

    #[tokio::test]
    async fn test_confirm_join_answers() {
        let c = classification();

        let prompts = TerminalPrompts::new(&b"yes\nn\n"[..]);
        assert_eq!(prompts.confirm_join(&c).await, Decision::Confirm);
        assert_eq!(prompts.confirm_join(&c).await, Decision::Decline);
        assert_eq!(prompts.confirm_join(&c).await, Decision::Cancel);

        let prompts = TerminalPrompts::new(&b""[..]).with_assume_yes(true);
        assert_eq!(prompts.confirm_join(&c).await, Decision::Confirm);
    }

    #[tokio::test]
    async fn test_ambiguous_defaults_to_abort() {
        let c = classification();

        let prompts = TerminalPrompts::new(&b"\n"[..]);
        assert_eq!(prompts.resolve_ambiguous_folder(&c).await, AmbiguousChoice::Abort);

        let prompts = TerminalPrompts::new(&b"y\n"[..]);
        assert_eq!(
            prompts.resolve_ambiguous_folder(&c).await,
            AmbiguousChoice::UseAsNewTeam
        );

        let prompts = TerminalPrompts::new(&b""[..]).with_use_as_new(true);
        assert_eq!(
            prompts.resolve_ambiguous_folder(&c).await,
            AmbiguousChoice::UseAsNewTeam
        );
    }
}
