// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Channel auto-processing
//!
//! An audio post in the source channel is downloaded, re-tagged through the
//! merge pipeline, re-sent with a thumbnail and the original post removed.
//! Every step after the tag write is best effort.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::admin::{AdminStore, AutoProcessingSettings, LogStatus, Statistic};
use crate::artwork::{self, CHANNEL_THUMB_SIZE};
use crate::db::RuleStore;
use crate::naming::sanitize_filename;
use crate::pipeline::{self, MergeOutcome, MergeRequest, TemplateOverlay};
use crate::tags::{self, CoverArt, SaveOptions, TagField};
use crate::templates::TemplateStore;
use crate::{AudioTagError, Result};

/// User id recorded for actions the service takes on its own
pub const SYSTEM_USER: i64 = 0;

/// A chat addressed by numeric id or public username
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatRef {
    Id(i64),
    Username(String),
}

impl ChatRef {
    /// `-100123` becomes an id, anything else a `@username`
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        match value.parse::<i64>() {
            Ok(id) => Some(ChatRef::Id(id)),
            Err(_) => Some(ChatRef::Username(format!("@{}", value.trim_start_matches('@')))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AudioAttachment {
    pub file_id: String,
    pub file_name: Option<String>,
    pub title: Option<String>,
    pub performer: Option<String>,
    pub size_bytes: u64,
}

/// The parts of a channel post the processor looks at
#[derive(Debug, Clone, Default)]
pub struct ChannelPost {
    pub chat_id: i64,
    pub chat_username: Option<String>,
    pub chat_title: Option<String>,
    pub is_channel: bool,
    pub message_id: i32,
    pub caption: Option<String>,
    pub audio: Option<AudioAttachment>,
}

impl ChannelPost {
    fn chat_label(&self) -> String {
        self.chat_title
            .clone()
            .unwrap_or_else(|| self.chat_id.to_string())
    }
}

/// An audio message to send
#[derive(Debug, Clone)]
pub struct OutgoingAudio<'a> {
    pub chat_id: i64,
    pub path: &'a Path,
    pub caption: Option<&'a str>,
    pub title: Option<&'a str>,
    pub performer: Option<&'a str>,
    pub thumbnail: Option<&'a Path>,
}

/// Messaging operations the processor needs
#[async_trait]
pub trait ChannelClient: Send + Sync {
    /// Save a remote file to `dest`
    async fn download(&self, file_id: &str, dest: &Path) -> Result<()>;

    /// Send an audio file; returns the new message id
    async fn send_audio(&self, audio: &OutgoingAudio<'_>) -> Result<i32>;

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<()>;

    /// Copy a message into `to`; returns the new message id
    async fn copy_message(
        &self,
        to: &ChatRef,
        from_chat_id: i64,
        message_id: i32,
        caption: Option<&str>,
    ) -> Result<i32>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    NoAudio,
    TooLarge,
}

#[derive(Debug)]
pub enum ProcessOutcome {
    Skipped(SkipReason),
    Published { message_id: i32, merge: MergeOutcome },
}

/// Result of re-tagging a local file
#[derive(Debug)]
pub struct LocalOutcome {
    pub output: PathBuf,
    pub merge: MergeOutcome,
}

/// Tag rewriting shared by channel posts and local files
#[derive(Clone)]
pub struct Retagger {
    admin: AdminStore,
    rules: RuleStore,
    templates: TemplateStore,
}

/// Runs the auto-processing pipeline against a [`ChannelClient`]
#[derive(Clone)]
pub struct AutoProcessor {
    client: Arc<dyn ChannelClient>,
    retagger: Retagger,
    temp_dir: PathBuf,
    max_audio_bytes: u64,
}

impl AutoProcessor {
    pub fn new(client: Arc<dyn ChannelClient>, retagger: Retagger, temp_dir: PathBuf) -> Self {
        Self {
            client,
            retagger,
            temp_dir,
            max_audio_bytes: 0,
        }
    }

    /// Skip audio larger than `mb` megabytes; 0 disables the check
    pub fn with_max_audio_mb(mut self, mb: u64) -> Self {
        self.max_audio_bytes = mb * 1024 * 1024;
        self
    }

    pub fn admin(&self) -> &AdminStore {
        &self.retagger.admin
    }

    /// Whether the post comes from the configured source channel
    pub fn matches_source(&self, post: &ChannelPost) -> Result<bool> {
        let settings = self.admin().auto_processing()?;
        Ok(source_matches(&settings.source_channel, post))
    }

    /// Process one channel post end to end
    pub async fn process(&self, post: &ChannelPost) -> Result<ProcessOutcome> {
        let settings = self.admin().auto_processing()?;
        if !settings.enabled {
            debug!("Auto-processing disabled, ignoring message {}", post.message_id);
            return Ok(ProcessOutcome::Skipped(SkipReason::Disabled));
        }
        let Some(audio) = &post.audio else {
            return Ok(ProcessOutcome::Skipped(SkipReason::NoAudio));
        };
        if self.max_audio_bytes > 0 && audio.size_bytes > self.max_audio_bytes {
            warn!(
                "Audio in message {} is {} bytes, over the limit",
                post.message_id, audio.size_bytes
            );
            return Ok(ProcessOutcome::Skipped(SkipReason::TooLarge));
        }

        let name = sanitize_filename(audio.file_name.as_deref().unwrap_or("audio.mp3"));
        let path = self.temp_dir.join(format!("ch_{}_{}", post.message_id, name));
        let thumb = thumbnail_path(&path);

        let result = self.publish(post, audio, &settings, &path, &thumb).await;

        for leftover in [&path, &thumb] {
            if leftover.exists() {
                if let Err(e) = std::fs::remove_file(leftover) {
                    warn!("Failed to remove temp file {:?}: {}", leftover, e);
                }
            }
        }

        match result {
            Ok((message_id, merge)) => {
                self.retagger.record(
                    LogStatus::Success,
                    &format!("Processed channel audio from {}", post.chat_label()),
                );
                Ok(ProcessOutcome::Published { message_id, merge })
            }
            Err(e) => {
                error!("Auto-processing message {} failed: {}", post.message_id, e);
                self.retagger.record(LogStatus::Failed, &format!("Error: {}", e));
                Err(e)
            }
        }
    }

    async fn publish(
        &self,
        post: &ChannelPost,
        audio: &AudioAttachment,
        settings: &AutoProcessingSettings,
        path: &Path,
        thumb: &Path,
    ) -> Result<(i32, MergeOutcome)> {
        std::fs::create_dir_all(&self.temp_dir)?;
        self.client.download(&audio.file_id, path).await?;
        info!("Downloaded {:?}", path);

        let merge = self.retagger.retag(path, settings)?;

        let thumbnail = match merge.tags.picture() {
            Some(cover) => match write_thumbnail(cover, thumb) {
                Ok(()) => Some(thumb),
                Err(e) => {
                    warn!("Thumbnail skipped: {}", e);
                    None
                }
            },
            None => None,
        };

        let caption = post
            .caption
            .as_deref()
            .filter(|c| settings.keep_caption && !c.is_empty());
        let title = non_empty(merge.tags.value(TagField::Title.as_str())).or(audio.title.as_deref());
        let performer =
            non_empty(merge.tags.value(TagField::Artist.as_str())).or(audio.performer.as_deref());

        let outgoing = OutgoingAudio {
            chat_id: post.chat_id,
            path,
            caption,
            title,
            performer,
            thumbnail,
        };
        let sent = match self.client.send_audio(&outgoing).await {
            Ok(id) => id,
            Err(e) => {
                warn!("Send with metadata failed ({}), retrying plain", e);
                let plain = OutgoingAudio {
                    title: None,
                    performer: None,
                    thumbnail: None,
                    ..outgoing
                };
                self.client.send_audio(&plain).await?
            }
        };
        info!("Sent re-tagged audio as message {}", sent);

        if let Err(e) = self.client.delete_message(post.chat_id, post.message_id).await {
            warn!("Could not delete original message {}: {}", post.message_id, e);
        }

        if settings.auto_publish && post.is_channel {
            let here = ChatRef::Id(post.chat_id);
            if let Err(e) = self.client.copy_message(&here, post.chat_id, sent, None).await {
                warn!("Auto-publish failed: {}", e);
            }
        }

        if settings.forward_to_target {
            if let Some(target) = ChatRef::parse(&settings.target_channel) {
                let caption = if settings.keep_caption { caption } else { None };
                match self.client.copy_message(&target, post.chat_id, sent, caption).await {
                    Ok(_) => info!("Forwarded to {:?}", target),
                    Err(e) => warn!("Forward to {:?} failed: {}", target, e),
                }
            }
        }

        Ok((sent, merge))
    }

}

impl Retagger {
    pub fn new(admin: AdminStore, rules: RuleStore, templates: TemplateStore) -> Self {
        Self {
            admin,
            rules,
            templates,
        }
    }

    pub fn admin(&self) -> &AdminStore {
        &self.admin
    }

    /// Re-tag a local file into `out_dir`, leaving the source untouched
    pub fn process_local(&self, path: &Path, out_dir: &Path) -> Result<LocalOutcome> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(sanitize_filename)
            .ok_or_else(|| AudioTagError::NotFound(format!("file name of {:?}", path)))?;

        std::fs::create_dir_all(out_dir)?;
        let output = out_dir.join(name);
        std::fs::copy(path, &output)?;

        let settings = self.admin.auto_processing()?;
        match self.retag(&output, &settings) {
            Ok(merge) => {
                self.record(LogStatus::Success, &format!("Processed local file {:?}", path));
                info!("Wrote {:?}", output);
                Ok(LocalOutcome { output, merge })
            }
            Err(e) => {
                if let Err(cleanup) = std::fs::remove_file(&output) {
                    warn!("Failed to remove {:?}: {}", output, cleanup);
                }
                self.record(LogStatus::Failed, &format!("Error: {}", e));
                Err(e)
            }
        }
    }

    /// Read, merge and write the tags of `path` in place
    fn retag(&self, path: &Path, settings: &AutoProcessingSettings) -> Result<MergeOutcome> {
        let base = tags::read_tags(path)?;

        let template = pipeline::find_smart_template(base.value(TagField::Artist.as_str()), &settings.smart_templates)
            .and_then(|(artist, id)| match self.templates.get(id) {
                Ok(Some(t)) => {
                    debug!("Smart template {} matches artist {}", id, artist);
                    Some(t)
                }
                Ok(None) => {
                    warn!("Smart template {} for {} is missing", id, artist);
                    None
                }
                Err(e) => {
                    warn!("Smart template {} unreadable: {}", id, e);
                    None
                }
            });
        let template_tags = template.as_ref().map(|t| t.tag_set());

        let smart_rules = self.rules.active().unwrap_or_else(|e| {
            warn!("Smart rules unavailable: {}", e);
            Vec::new()
        });
        let text_rules = settings.text_rules();
        let footer = settings.footer();

        let request = MergeRequest {
            template: template.as_ref().zip(template_tags.as_ref()).map(|(t, tags)| TemplateOverlay {
                name: &t.name,
                tags,
                protect_identity: true,
            }),
            manual: None,
            text_rules: Some(&text_rules),
            smart_rules: &smart_rules,
            footer: footer.as_ref(),
        };
        let mut merge = pipeline::merge(&base, &request);

        self.watermark_cover(&mut merge)?;

        tags::write_tags(path, &merge.tags, &SaveOptions::default())?;
        Ok(merge)
    }

    fn watermark_cover(&self, merge: &mut MergeOutcome) -> Result<()> {
        let settings = self.admin.watermark()?;
        if !settings.enabled || settings.image_path.is_empty() {
            return Ok(());
        }
        let Some(cover) = merge.tags.picture() else {
            return Ok(());
        };

        let marked = std::fs::read(&settings.image_path)
            .map_err(AudioTagError::from)
            .and_then(|mark| artwork::apply_watermark(&cover.data, &mark, &settings));
        match marked {
            Ok(data) => {
                merge.tags.set_picture(Some(CoverArt::new(data, "image/jpeg")));
                debug!("Watermark applied to cover");
            }
            Err(e) => warn!("Watermark skipped: {}", e),
        }
        Ok(())
    }

    fn record(&self, status: LogStatus, details: &str) {
        let stats: &[Statistic] = match status {
            LogStatus::Success => &[Statistic::FilesProcessed, Statistic::SuccessfulEdits],
            LogStatus::Failed => &[Statistic::FailedOperations],
        };
        let result = self
            .admin
            .log_action(SYSTEM_USER, "auto_process_channel_file", status, details)
            .and_then(|_| {
                stats
                    .iter()
                    .try_for_each(|s| self.admin.increment_statistic(*s, 1))
            });
        if let Err(e) = result {
            warn!("Could not record processing result: {}", e);
        }
    }
}

/// Compare a configured source channel against a post's chat
pub fn source_matches(source: &str, post: &ChannelPost) -> bool {
    let source = source.trim().trim_start_matches('@');
    if source.is_empty() {
        return false;
    }
    post.chat_username.as_deref() == Some(source) || post.chat_id.to_string() == source
}

fn non_empty(value: &str) -> Option<&str> {
    (!value.is_empty()).then_some(value)
}

fn thumbnail_path(audio: &Path) -> PathBuf {
    let stem = audio
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("audio");
    audio.with_file_name(format!("{}_thumb.jpg", stem))
}

/// 512px square JPEG; falls back to the raw cover bytes when it cannot be decoded
fn write_thumbnail(cover: &CoverArt, dest: &Path) -> Result<()> {
    let data = match artwork::square_thumbnail(&cover.data, CHANNEL_THUMB_SIZE) {
        Ok(jpeg) => jpeg,
        Err(e) => {
            warn!("Thumbnail resize failed, using cover as is: {}", e);
            cover.data.clone()
        }
    };
    std::fs::write(dest, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db::Database;
    use crate::rules::{ActionType, ConditionOperator, NewRule};
    use crate::tags::test_audio;
    use crate::tags::TagSet;
    use crate::templates::Template;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Download(String),
        Send {
            chat: i64,
            caption: Option<String>,
            title: Option<String>,
            performer: Option<String>,
            thumbnail: bool,
        },
        Delete(i64, i32),
        Copy(ChatRef, i32, Option<String>),
    }

    #[derive(Default)]
    struct FakeClient {
        source: Vec<u8>,
        fail_download: bool,
        fail_rich_send: bool,
        calls: Mutex<Vec<Call>>,
        sent_tags: Mutex<Option<TagSet>>,
    }

    impl FakeClient {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChannelClient for FakeClient {
        async fn download(&self, file_id: &str, dest: &Path) -> Result<()> {
            self.calls.lock().unwrap().push(Call::Download(file_id.to_string()));
            if self.fail_download {
                return Err(AudioTagError::Telegram("file is gone".to_string()));
            }
            std::fs::write(dest, &self.source)?;
            Ok(())
        }

        async fn send_audio(&self, audio: &OutgoingAudio<'_>) -> Result<i32> {
            if self.fail_rich_send && audio.title.is_some() {
                return Err(AudioTagError::Telegram("bad thumbnail".to_string()));
            }
            *self.sent_tags.lock().unwrap() = Some(tags::read_tags(audio.path)?);
            self.calls.lock().unwrap().push(Call::Send {
                chat: audio.chat_id,
                caption: audio.caption.map(String::from),
                title: audio.title.map(String::from),
                performer: audio.performer.map(String::from),
                thumbnail: audio.thumbnail.map_or(false, |p| p.exists()),
            });
            Ok(500)
        }

        async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<()> {
            self.calls.lock().unwrap().push(Call::Delete(chat_id, message_id));
            Ok(())
        }

        async fn copy_message(
            &self,
            to: &ChatRef,
            _from_chat_id: i64,
            message_id: i32,
            caption: Option<&str>,
        ) -> Result<i32> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Copy(to.clone(), message_id, caption.map(String::from)));
            Ok(501)
        }
    }

    fn tagged_mp3(dir: &Path) -> Vec<u8> {
        let path = dir.join("fixture.mp3");
        std::fs::write(&path, test_audio::mp3_bytes()).unwrap();
        let mut tags: TagSet = [
            ("title", "Song www.spam.com"),
            ("artist", "Fairuz"),
            ("genre", ""),
        ]
        .into_iter()
        .collect();
        tags.set_picture(Some(CoverArt::sniff(test_audio::png_bytes(64, 48))));
        tags::write_tags(&path, &tags, &SaveOptions::default()).unwrap();
        std::fs::read(&path).unwrap()
    }

    struct Harness {
        _dir: tempfile::TempDir,
        temp_dir: PathBuf,
        admin: AdminStore,
        processor: AutoProcessor,
        client: Arc<FakeClient>,
    }

    fn harness(client: FakeClient, enabled: bool) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let admin = AdminStore::in_memory(&AppConfig::default());
        admin.set_auto_processing_enabled(enabled).unwrap();
        admin.set_source_channel("@source").unwrap();

        let db = Database::in_memory().unwrap();
        let templates = TemplateStore::new(dir.path().join("templates"));
        let temp_dir = dir.path().join("temp");

        let client = Arc::new(client);
        let retagger = Retagger::new(admin.clone(), db.rules(), templates);
        let processor = AutoProcessor::new(client.clone(), retagger, temp_dir.clone());
        Harness {
            _dir: dir,
            temp_dir,
            admin,
            processor,
            client,
        }
    }

    fn post() -> ChannelPost {
        ChannelPost {
            chat_id: -100_42,
            chat_username: Some("source".to_string()),
            chat_title: Some("Source".to_string()),
            is_channel: true,
            message_id: 7,
            caption: Some("from the archive".to_string()),
            audio: Some(AudioAttachment {
                file_id: "FILE".to_string(),
                file_name: Some("my song?.mp3".to_string()),
                title: Some("Fallback".to_string()),
                performer: None,
                size_bytes: 1024,
            }),
        }
    }

    #[test]
    fn test_chat_ref_parse() {
        assert_eq!(ChatRef::parse("-100123"), Some(ChatRef::Id(-100123)));
        assert_eq!(ChatRef::parse("chan"), Some(ChatRef::Username("@chan".into())));
        assert_eq!(ChatRef::parse("@chan"), Some(ChatRef::Username("@chan".into())));
        assert_eq!(ChatRef::parse("  "), None);
    }

    #[test]
    fn test_source_matching() {
        let p = post();
        assert!(source_matches("@source", &p));
        assert!(source_matches("source", &p));
        assert!(source_matches("-10042", &p));
        assert!(!source_matches("@other", &p));
        assert!(!source_matches("", &p));
    }

    #[tokio::test]
    async fn test_disabled_and_audio_less_posts_are_skipped() {
        let h = harness(FakeClient::default(), false);
        let outcome = h.processor.process(&post()).await.unwrap();
        assert!(matches!(outcome, ProcessOutcome::Skipped(SkipReason::Disabled)));

        let h = harness(FakeClient::default(), true);
        let mut p = post();
        p.audio = None;
        let outcome = h.processor.process(&p).await.unwrap();
        assert!(matches!(outcome, ProcessOutcome::Skipped(SkipReason::NoAudio)));
        assert!(h.client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_audio_is_skipped() {
        let h = harness(FakeClient::default(), true);
        let processor = h.processor.clone().with_max_audio_mb(1);
        let mut p = post();
        if let Some(a) = p.audio.as_mut() {
            a.size_bytes = 2 * 1024 * 1024;
        }
        let outcome = processor.process(&p).await.unwrap();
        assert!(matches!(outcome, ProcessOutcome::Skipped(SkipReason::TooLarge)));
    }

    #[tokio::test]
    async fn test_full_channel_flow() {
        let fixture_dir = tempfile::tempdir().unwrap();
        let client = FakeClient {
            source: tagged_mp3(fixture_dir.path()),
            ..Default::default()
        };
        let h = harness(client, true);

        h.admin
            .update_setting("auto_processing.remove_links", json!(true))
            .unwrap();
        h.admin.set_tag_footer("@mine", true).unwrap();
        h.admin
            .update_setting(
                "auto_processing.footer_tag_settings",
                json!({"artist": false, "genre": false, "year": false, "lyrics": false}),
            )
            .unwrap();
        h.admin.set_target_channel("@target").unwrap();
        h.admin.set_forward_to_target(true).unwrap();
        h.admin.add_smart_template("fairuz", "fairuz_classic").unwrap();

        let template_tags: TagSet = [("genre", "Tarab"), ("title", "Never")].into_iter().collect();
        h.processor
            .retagger
            .templates
            .save(&Template::from_tags("Classic", "Fairuz", &template_tags))
            .unwrap();
        h.processor
            .retagger
            .rules
            .create(
                &NewRule {
                    name: "tarab-year".to_string(),
                    condition_field: "genre".to_string(),
                    condition_operator: ConditionOperator::Equals,
                    condition_value: "tarab".to_string(),
                    action_type: ActionType::Set,
                    action_field: "year".to_string(),
                    action_value: "1970".to_string(),
                    ..NewRule::default()
                },
                1,
            )
            .unwrap();

        let outcome = h.processor.process(&post()).await.unwrap();
        let ProcessOutcome::Published { message_id, merge } = outcome else {
            panic!("expected the post to be published");
        };
        assert_eq!(message_id, 500);
        assert_eq!(merge.template.as_deref(), Some("Classic"));
        assert_eq!(merge.applied_rules, vec!["tarab-year".to_string()]);

        let sent = h.client.sent_tags.lock().unwrap().clone().unwrap();
        assert_eq!(sent.get("title"), Some("Song - @mine"));
        assert_eq!(sent.get("genre"), Some("Tarab"));
        assert_eq!(sent.get("year"), Some("1970"));
        assert_eq!(sent.get("artist"), Some("Fairuz"));

        let calls = h.client.calls();
        assert_eq!(calls[0], Call::Download("FILE".to_string()));
        assert_eq!(
            calls[1],
            Call::Send {
                chat: -100_42,
                caption: Some("from the archive".to_string()),
                title: Some("Song - @mine".to_string()),
                performer: Some("Fairuz".to_string()),
                thumbnail: true,
            }
        );
        assert_eq!(calls[2], Call::Delete(-100_42, 7));
        assert_eq!(calls[3], Call::Copy(ChatRef::Id(-100_42), 500, None));
        assert_eq!(
            calls[4],
            Call::Copy(
                ChatRef::Username("@target".to_string()),
                500,
                Some("from the archive".to_string())
            )
        );

        let leftovers = std::fs::read_dir(&h.temp_dir).unwrap().count();
        assert_eq!(leftovers, 0);

        let stats = h.admin.statistics().unwrap();
        assert_eq!(stats.total_files_processed, 1);
        assert_eq!(stats.successful_edits, 1);
        assert_eq!(h.admin.recent_logs(1).unwrap()[0].status, LogStatus::Success);
    }

    #[tokio::test]
    async fn test_rich_send_failure_falls_back_to_plain() {
        let fixture_dir = tempfile::tempdir().unwrap();
        let client = FakeClient {
            source: tagged_mp3(fixture_dir.path()),
            fail_rich_send: true,
            ..Default::default()
        };
        let h = harness(client, true);
        h.admin.update_setting("auto_processing.keep_caption", json!(false)).unwrap();

        h.processor.process(&post()).await.unwrap();
        let sends: Vec<Call> = h
            .client
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Send { .. }))
            .collect();
        assert_eq!(
            sends,
            vec![Call::Send {
                chat: -100_42,
                caption: None,
                title: None,
                performer: None,
                thumbnail: false,
            }]
        );
    }

    #[tokio::test]
    async fn test_download_failure_is_recorded() {
        let client = FakeClient {
            fail_download: true,
            ..Default::default()
        };
        let h = harness(client, true);

        assert!(h.processor.process(&post()).await.is_err());
        assert_eq!(h.admin.statistics().unwrap().failed_operations, 1);
        let logs = h.admin.error_logs(5).unwrap();
        assert_eq!(logs.len(), 1);
        assert!(logs[0].details.contains("file is gone"));
    }

    #[test]
    fn test_process_local_keeps_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.mp3");
        std::fs::write(&source, tagged_mp3(dir.path())).unwrap();
        let original = std::fs::read(&source).unwrap();

        let h = harness(FakeClient::default(), false);
        h.admin
            .update_setting("auto_processing.remove_links", json!(true))
            .unwrap();

        let out = h.processor.retagger.process_local(&source, &dir.path().join("out")).unwrap();
        assert_eq!(std::fs::read(&source).unwrap(), original);
        let tags = tags::read_tags(&out.output).unwrap();
        assert_eq!(tags.get("title"), Some("Song"));
        assert!(out.merge.changed_fields.contains(&"title".to_string()));
    }
}
