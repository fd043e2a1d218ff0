use super::{Checkpoint, MessageStore, ThreadLease, ThreadLocks};
use crate::error::StoreError;
use crate::events::{ConversationState, Message};
use async_trait::async_trait;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// Persists each thread as `<thread_id>.jsonl` under one directory.
///
/// Every message is serialized up front and written as a single line. A crash
/// mid-write can leave an unterminated last line; `load` skips it and the next
/// append truncates it away, so only complete messages are ever read back.
pub struct FileMessageStore {
    dir: PathBuf,
    require_registration: bool,
    locks: ThreadLocks,
}

impl FileMessageStore {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            require_registration: false,
            locks: ThreadLocks::default(),
        })
    }

    pub fn require_registration(mut self, required: bool) -> Self {
        self.require_registration = required;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn thread_path(&self, thread_id: &str) -> Result<PathBuf, StoreError> {
        validate_thread_id(thread_id)?;
        Ok(self.dir.join(format!("{}.jsonl", thread_id)))
    }

    async fn write_lines(&self, path: &Path, messages: &[Message], create: bool) -> Result<(), StoreError> {
        let mut buf = String::new();
        for message in messages {
            buf.push_str(&serde_json::to_string(message)?);
            buf.push('\n');
        }

        let mut file = OpenOptions::new()
            .create(create)
            .append(true)
            .open(path)
            .await?;
        file.write_all(buf.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Cuts the file back to its last newline.
async fn trim_torn_tail(path: &Path) -> Result<(), StoreError> {
    let mut file = match OpenOptions::new().read(true).write(true).open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    let len = file.metadata().await?.len();
    let mut end = len;
    let mut byte = [0u8; 1];
    while end > 0 {
        file.seek(SeekFrom::Start(end - 1)).await?;
        file.read_exact(&mut byte).await?;
        if byte[0] == b'\n' {
            break;
        }
        end -= 1;
    }
    if end < len {
        tracing::warn!(
            path = %path.display(),
            "Truncating {} bytes of an unterminated trailing line",
            len - end
        );
        file.set_len(end).await?;
    }
    Ok(())
}

fn validate_thread_id(thread_id: &str) -> Result<(), StoreError> {
    let invalid = thread_id.is_empty()
        || thread_id.contains('/')
        || thread_id.contains('\\')
        || thread_id.contains("..")
        || thread_id.chars().any(char::is_control);
    if invalid {
        return Err(StoreError::InvalidThreadId(thread_id.to_string()));
    }
    Ok(())
}

#[async_trait]
impl MessageStore for FileMessageStore {
    async fn register(&self, thread_id: &str) -> Result<(), StoreError> {
        let path = self.thread_path(thread_id)?;
        self.write_lines(&path, &[], true).await
    }

    async fn append(&self, thread_id: &str, message: Message) -> Result<(), StoreError> {
        self.append_all(thread_id, vec![message]).await
    }

    async fn append_all(&self, thread_id: &str, messages: Vec<Message>) -> Result<(), StoreError> {
        let path = self.thread_path(thread_id)?;
        trim_torn_tail(&path).await?;
        match self
            .write_lines(&path, &messages, !self.require_registration)
            .await
        {
            Err(StoreError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::UnknownThread(thread_id.to_string()))
            }
            other => other,
        }
    }

    async fn load(&self, thread_id: &str) -> Result<ConversationState, StoreError> {
        let path = self.thread_path(thread_id)?;
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(thread_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let (complete, torn) = match content.rfind('\n') {
            Some(end) => content.split_at(end + 1),
            None => ("", content.as_str()),
        };
        if !torn.trim().is_empty() {
            tracing::warn!(
                thread_id,
                "Ignoring {} bytes of an unterminated trailing line",
                torn.len()
            );
        }

        let messages = complete
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str::<Message>)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ConversationState::new(thread_id, messages))
    }

    async fn restore(&self, checkpoint: &Checkpoint) -> Result<ConversationState, StoreError> {
        let state = checkpoint.state();
        let path = self.thread_path(&state.thread_id)?;

        // Write the full snapshot aside, then swap it in.
        let tmp = path.with_extension("jsonl.tmp");
        let _ = fs::remove_file(&tmp).await;
        self.write_lines(&tmp, &state.messages, true).await?;
        fs::rename(&tmp, &path).await?;
        Ok(state)
    }

    async fn lease(&self, thread_id: &str) -> ThreadLease {
        self.locks.acquire(thread_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ToolCallRequest, ToolResult};
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_messages_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let call = ToolCallRequest::new("call_1", "play_song_on_spotify", json!({"song": "Anti-Hero"}));

        {
            let store = FileMessageStore::open(temp_dir.path()).await.unwrap();
            store
                .append("1", Message::user("Can you play Taylor Swift's most popular song?"))
                .await
                .unwrap();
            store
                .append("1", Message::assistant_with_tools("", vec![call.clone()]))
                .await
                .unwrap();
            store
                .append(
                    "1",
                    Message::from(ToolResult::success(
                        &call,
                        json!("Successfully played Anti-Hero on Spotify!"),
                    )),
                )
                .await
                .unwrap();
        }

        let reopened = FileMessageStore::open(temp_dir.path()).await.unwrap();
        let state = reopened.load("1").await.unwrap();
        assert_eq!(state.messages.len(), 3);
        assert_eq!(state.messages[1].tool_calls, vec![call]);
        assert_eq!(
            state.messages[2].content,
            "Successfully played Anti-Hero on Spotify!"
        );
    }

    #[tokio::test]
    async fn test_rejects_path_like_thread_ids() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileMessageStore::open(temp_dir.path()).await.unwrap();

        for bad in ["../escape", "a/b", "", "tab\there"] {
            let err = store.append(bad, Message::user("x")).await.unwrap_err();
            assert!(matches!(err, StoreError::InvalidThreadId(_)), "{bad:?}");
        }
    }

    #[tokio::test]
    async fn test_required_registration_and_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileMessageStore::open(temp_dir.path())
            .await
            .unwrap()
            .require_registration(true);

        let err = store.append("t1", Message::user("hi")).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownThread(_)));
        assert!(matches!(
            store.load("t1").await.unwrap_err(),
            StoreError::NotFound(_)
        ));

        store.register("t1").await.unwrap();
        store.append("t1", Message::user("hi")).await.unwrap();
        assert_eq!(store.load("t1").await.unwrap().messages.len(), 1);
    }

    #[tokio::test]
    async fn test_torn_trailing_line_is_skipped_then_truncated() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileMessageStore::open(temp_dir.path()).await.unwrap();
        store.append("t1", Message::user("first")).await.unwrap();

        // A write cut short by a crash.
        let path = temp_dir.path().join("t1.jsonl");
        let mut file = OpenOptions::new().append(true).open(&path).await.unwrap();
        file.write_all(br#"{"role":"assistant","cont"#).await.unwrap();
        file.flush().await.unwrap();
        drop(file);

        let state = store.load("t1").await.unwrap();
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].content, "first");

        store.append("t1", Message::assistant("second")).await.unwrap();
        let state = store.load("t1").await.unwrap();
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[1].content, "second");
        assert!(fs::read_to_string(&path).await.unwrap().ends_with("}\n"));
    }

    #[tokio::test]
    async fn test_restore_replaces_history() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileMessageStore::open(temp_dir.path()).await.unwrap();
        store.append("t1", Message::user("first")).await.unwrap();
        store.append("t1", Message::assistant("answer")).await.unwrap();
        let checkpoint = store.checkpoint("t1").await.unwrap();
        let before = store.load("t1").await.unwrap();

        store.append("t1", Message::user("second")).await.unwrap();
        let restored = store.restore(&checkpoint).await.unwrap();

        assert_eq!(restored, before);
        assert_eq!(store.load("t1").await.unwrap(), before);
    }
}
