use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local};
use coach_shared::{ChatMessage, MessageRole};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::prompt::UserProfile;

pub const GREETING: &str = "👋 **Hi! I am your AI Career Coach.**\n\n\
I have pre-analyzed your profile. I am here to help you boost your career path. Together we can:\n\n\
🚀 Explore new career opportunities\n\
🗣️ Conduct personalized interview simulations\n\
📝 Optimize your CV to pass ATS filters\n\
🎯 Define a tailored development plan\n\n\
**Where would you like to start today?**";

const TRANSCRIPT_FILE: &str = "chat_messages.json";
const PROFILE_FILE: &str = "user_context.json";

#[derive(Debug, Serialize, Deserialize)]
struct Saved<T> {
    saved_at: DateTime<Local>,
    data: T,
}

/// Chat transcript and user profile, persisted as JSON files in one
/// directory. Every mutation is written through.
pub struct TranscriptStore {
    dir: PathBuf,
    messages: Vec<ChatMessage>,
    profile: Option<UserProfile>,
}

impl TranscriptStore {
    /// Loads saved state from `dir`, or starts a fresh transcript holding
    /// only the greeting.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("could not create data directory {}", dir.display()))?;

        let messages = load::<Vec<ChatMessage>>(&dir.join(TRANSCRIPT_FILE))
            .filter(|m| !m.is_empty())
            .unwrap_or_else(initial_transcript);
        let profile = load::<UserProfile>(&dir.join(PROFILE_FILE));

        debug!(dir = %dir.display(), messages = messages.len(), has_profile = profile.is_some(), "transcript store opened");
        Ok(Self { dir, messages, profile })
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        self.profile.as_ref()
    }

    pub fn push(&mut self, message: ChatMessage) -> Result<()> {
        self.messages.push(message);
        self.save()
    }

    /// Overwrites a trailing assistant message, or appends one.
    pub fn replace_last_assistant(&mut self, content: impl Into<String>) -> Result<()> {
        match self.messages.last_mut() {
            Some(last) if last.role == MessageRole::Assistant => last.content = content.into(),
            _ => self.messages.push(ChatMessage::assistant(content)),
        }
        self.save()
    }

    pub fn set_profile(&mut self, profile: UserProfile) -> Result<()> {
        let (Some(name), Some(role)) = (profile.name.as_deref(), profile.role.as_deref()) else {
            bail!("a profile needs at least a name and a role");
        };
        let notice = format!(
            "✅ Profile created for {name}. I have noted your role as {role} and your goals."
        );
        self.profile = Some(profile);
        self.messages.push(ChatMessage::system(notice));
        self.save()
    }

    pub fn save(&self) -> Result<()> {
        store(&self.dir.join(TRANSCRIPT_FILE), &self.messages)?;
        match &self.profile {
            Some(profile) => store(&self.dir.join(PROFILE_FILE), profile),
            None => remove_if_present(&self.dir.join(PROFILE_FILE)),
        }
    }

    /// Wipes everything on disk and starts over from the greeting.
    pub fn reset(&mut self) -> Result<()> {
        remove_if_present(&self.dir.join(TRANSCRIPT_FILE))?;
        remove_if_present(&self.dir.join(PROFILE_FILE))?;
        self.messages = initial_transcript();
        self.profile = None;
        debug!(dir = %self.dir.display(), "transcript store reset");
        Ok(())
    }

    pub fn location(&self) -> &Path {
        &self.dir
    }
}

fn initial_transcript() -> Vec<ChatMessage> {
    vec![ChatMessage::assistant(GREETING)]
}

fn load<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let text = fs::read_to_string(path).ok()?;
    match serde_json::from_str::<Saved<T>>(&text) {
        Ok(saved) => Some(saved.data),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable saved state");
            None
        }
    }
}

fn store<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(&Saved {
        saved_at: Local::now(),
        data,
    })?;
    fs::write(path, json).with_context(|| format!("could not write {}", path.display()))
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("could not remove {}", path.display())),
    }
}
