use serde::{Deserialize, Serialize};

use crate::artifacts::Artifact;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    content: Vec<Artifact>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<Artifact>) -> Self {
        Self { role, content: vec![content.into()] }
    }

    /// Builds a multi-part message; returns `None` when `parts` is empty.
    pub fn from_parts(role: Role, parts: Vec<Artifact>) -> Option<Self> {
        if parts.is_empty() {
            return None;
        }
        Some(Self { role, content: parts })
    }

    pub fn system(content: impl Into<Artifact>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<Artifact>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<Artifact>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn content(&self) -> &[Artifact] {
        &self.content
    }

    pub fn to_text(&self) -> String {
        self.content.iter().map(Artifact::to_text).collect::<Vec<_>>().join("\n")
    }

    /// Collapses the message into a single artifact: the only part as-is,
    /// several parts as a list.
    pub fn into_artifact(mut self) -> Artifact {
        if self.content.len() == 1 {
            if let Some(only) = self.content.pop() {
                return only;
            }
        }
        Artifact::List(self.content)
    }
}

/// Ordered conversation handed to a prompt driver.
///
/// System messages always form a leading block: adding one after user or
/// assistant turns places it at the end of that block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptStack {
    messages: Vec<Message>,
}

impl PromptStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn add_message(&mut self, message: Message) {
        if message.role == Role::System {
            let at =
                self.messages.iter().take_while(|existing| existing.role == Role::System).count();
            self.messages.insert(at, message);
        } else {
            self.messages.push(message);
        }
    }

    pub fn add_system_message(&mut self, content: impl Into<Artifact>) {
        self.add_message(Message::system(content));
    }

    pub fn add_user_message(&mut self, content: impl Into<Artifact>) {
        self.add_message(Message::user(content));
    }

    pub fn add_assistant_message(&mut self, content: impl Into<Artifact>) {
        self.add_message(Message::assistant(content));
    }

    pub fn system_messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|message| message.role == Role::System)
    }

    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|message| message.role == Role::User)
    }
}

/// Partial message produced while a driver streams its answer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaMessage {
    pub role: Option<Role>,
    pub content: Option<String>,
}

impl DeltaMessage {
    pub fn chunk(content: impl Into<String>) -> Self {
        Self { role: Some(Role::Assistant), content: Some(content.into()) }
    }
}

#[cfg(test)]
mod tests {
    use super::{Message, PromptStack, Role};
    use crate::artifacts::Artifact;

    #[test]
    fn system_messages_stay_ahead_of_turns() {
        let mut stack = PromptStack::new();
        stack.add_system_message("rules");
        stack.add_user_message("question");
        stack.add_assistant_message("answer");
        stack.add_system_message("late rules");

        let roles: Vec<Role> = stack.messages().iter().map(|message| message.role).collect();
        assert_eq!(roles, vec![Role::System, Role::System, Role::User, Role::Assistant]);
        assert_eq!(stack.messages()[1].to_text(), "late rules");
        assert_eq!(stack.system_messages().count(), 2);
        assert_eq!(stack.last_user_message().map(Message::to_text).as_deref(), Some("question"));
    }

    #[test]
    fn messages_require_at_least_one_part() {
        assert!(Message::from_parts(Role::User, Vec::new()).is_none());

        let message = Message::from_parts(
            Role::Assistant,
            vec![Artifact::text("first"), Artifact::text("second")],
        )
        .expect("two parts");
        assert_eq!(message.to_text(), "first\nsecond");
        assert_eq!(
            message.into_artifact(),
            Artifact::list([Artifact::text("first"), Artifact::text("second")])
        );
        assert_eq!(Message::user("solo").into_artifact(), Artifact::text("solo"));
    }
}
