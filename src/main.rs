// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! audiotag: audio tag editor with templates and smart rules
//!
//! Command-line front end for reading and editing tags, managing templates,
//! smart rules and admin settings, and running the local inbox watcher.

use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use audiotag::admin::{AdminStore, LogEntry, UserRecord};
use audiotag::artwork::{self, WatermarkPosition, PREVIEW_THUMB_SIZE};
use audiotag::autoproc::Retagger;
use audiotag::config::AppConfig;
use audiotag::db::{Database, UserTemplate, UserTemplateStore};
use audiotag::inbox;
use audiotag::naming::short_caption;
use audiotag::pipeline::{self, MergeRequest, TemplateOverlay};
use audiotag::rules::{self, ActionType, ConditionOperator, NewRule, SmartRule, DEFAULT_PRIORITY};
use audiotag::tags::{self, AudioFormat, CoverArt, SaveOptions, TagField, TagSet};
use audiotag::templates::{extract_artist, Template, TemplateStore};
use audiotag::{AudioTagError, Result};

/// audiotag CLI - audio tag editor
#[derive(Parser, Debug)]
#[command(name = "audiotag")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version = "1.0.0")]
#[command(about = "Audio tag editor with templates, smart rules and auto-processing", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (JSON format)
    #[arg(short, long, default_value = "config.json", global = true)]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Output format for results
    #[arg(long, global = true, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Read and edit the tags of a file
    Tags {
        #[command(subcommand)]
        action: TagCommands,
    },

    /// Run the auto-processing pipeline on a local file
    Process {
        file: PathBuf,

        /// Output directory (default: inbox output_dir)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Watch inbox directories and re-tag new audio
    Watch {
        /// Directories to watch (overrides config)
        #[arg(short, long)]
        dir: Vec<PathBuf>,

        /// Output directory (overrides config)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Process files already in the inbox on startup
        #[arg(long)]
        process_existing: bool,
    },

    /// Smart rules
    Rules {
        #[command(subcommand)]
        action: RuleCommands,
    },

    /// Shared artist templates
    Templates {
        #[command(subcommand)]
        action: TemplateCommands,
    },

    /// Per-user templates
    UserTemplates {
        #[command(subcommand)]
        action: UserTemplateCommands,
    },

    /// Auto-processing and bot settings
    Settings {
        #[command(subcommand)]
        action: SettingsCommands,
    },

    /// Admins, users, logs and statistics
    Admin {
        #[command(subcommand)]
        action: AdminCommands,
    },

    /// Database operations
    Db {
        #[command(subcommand)]
        action: DbCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Create a config file and working directories
    Init {
        /// Directory to initialize (default: current)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Force overwrite existing configuration
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum TagCommands {
    /// Show the tags of a file
    Show { file: PathBuf },

    /// Edit tags, apply smart rules and save
    Edit {
        file: PathBuf,

        /// Field to set, as key=value (repeatable)
        #[arg(short, long = "set", value_parser = parse_key_value)]
        set: Vec<(String, String)>,

        /// Image to embed as the front cover
        #[arg(long)]
        picture: Option<PathBuf>,

        /// Text file with the lyrics
        #[arg(long)]
        lyrics_file: Option<PathBuf>,

        /// Do not apply smart rules
        #[arg(long)]
        no_rules: bool,
    },

    /// Extract the embedded cover
    Cover {
        file: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// Write a small square preview instead of the full image
        #[arg(long)]
        thumbnail: bool,
    },
}

#[derive(Subcommand, Debug)]
enum RuleCommands {
    /// List rules
    List {
        /// Include inactive rules
        #[arg(long)]
        all: bool,

        /// Only rules created by this user
        #[arg(long)]
        creator: Option<i64>,
    },

    /// Add a rule
    Add {
        #[arg(long)]
        name: String,

        #[arg(long)]
        description: Option<String>,

        /// Field the condition looks at
        #[arg(long = "if-field")]
        condition_field: String,

        /// contains, equals, starts_with or ends_with
        #[arg(long = "op", default_value = "contains")]
        operator: ConditionOperator,

        #[arg(long = "if-value")]
        condition_value: String,

        /// add, set or replace
        #[arg(long, default_value = "set")]
        action: ActionType,

        /// Field the action changes ("*" for every field with replace)
        #[arg(long = "then-field")]
        action_field: String,

        #[arg(long = "then-value")]
        action_value: String,

        #[arg(long, default_value_t = DEFAULT_PRIORITY)]
        priority: i64,

        /// Store the rule disabled
        #[arg(long)]
        inactive: bool,

        #[arg(long, default_value_t = 0)]
        creator: i64,
    },

    /// Delete a rule
    Remove { id: i64 },

    /// Enable or disable a rule
    Toggle { id: i64 },

    /// Run the active rules over a sample text
    Test {
        text: String,

        #[arg(long, default_value = "title")]
        field: String,
    },

    /// Run one rule over a sample text
    TestRule {
        id: i64,
        text: String,

        #[arg(long)]
        field: Option<String>,
    },

    /// Suggest a rule from two tag snapshots (JSON objects)
    Suggest {
        old: PathBuf,
        new: PathBuf,

        /// Store the suggestion
        #[arg(long)]
        save: bool,
    },
}

#[derive(Subcommand, Debug)]
enum TemplateCommands {
    /// List templates
    List {
        #[arg(long)]
        artist: Option<String>,
    },

    /// List artists with templates
    Artists,

    /// Show one template
    Show { id: String },

    /// Save the tags of a file as a template
    Save {
        #[arg(long)]
        name: String,

        /// Artist (default: taken from the file)
        #[arg(long)]
        artist: Option<String>,

        #[arg(long)]
        from: PathBuf,
    },

    /// Apply a template to a file
    Apply { id: String, file: PathBuf },

    /// Delete a template
    Delete { id: String },

    /// Export all templates as a zip
    Export {
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Import templates from a zip
    Import { zip: PathBuf },
}

#[derive(Subcommand, Debug)]
enum UserTemplateCommands {
    /// List a user's templates
    List {
        #[arg(long)]
        user: i64,

        #[arg(long)]
        artist: Option<String>,
    },

    /// Save the tags of a file as a user template
    Save {
        #[arg(long)]
        user: i64,

        #[arg(long)]
        name: String,

        #[arg(long)]
        artist: Option<String>,

        #[arg(long)]
        from: PathBuf,
    },

    /// Delete a user template
    Delete {
        #[arg(long)]
        user: i64,
        id: i64,
    },

    /// Make a template public
    Share {
        #[arg(long)]
        user: i64,
        id: i64,
    },

    /// Make a template private again
    Unshare {
        #[arg(long)]
        user: i64,
        id: i64,
    },

    /// List public templates
    Public {
        #[arg(long)]
        artist: Option<String>,
    },

    /// Copy a public template into a user's collection
    Copy {
        id: i64,

        #[arg(long)]
        user: i64,

        #[arg(long)]
        name: Option<String>,
    },

    /// Export a user's templates as a zip
    Export {
        #[arg(long)]
        user: i64,

        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Import templates for a user from a zip
    Import {
        #[arg(long)]
        user: i64,
        zip: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsCommands {
    /// Print all settings
    Show,

    /// Read a setting by dotted path
    Get { path: String },

    /// Write a setting; the value is parsed as JSON, or kept as a string
    Set { path: String, value: String },

    /// Turn channel auto-processing on or off
    Auto {
        #[arg(action = ArgAction::Set)]
        enabled: bool,
    },

    /// Text replacements applied to every enabled tag
    Replacement {
        #[command(subcommand)]
        action: ReplacementCommands,
    },

    /// Artist to template mappings used by auto-processing
    SmartTemplate {
        #[command(subcommand)]
        action: SmartTemplateCommands,
    },

    /// Channel to watch for new audio
    Source { channel: String },

    /// Channel to copy processed audio into
    Target {
        channel: String,

        /// Also enable forwarding
        #[arg(long)]
        forward: bool,
    },

    /// Text appended to tags
    Footer {
        text: String,

        #[arg(long)]
        disable: bool,
    },

    /// Cover watermark
    Watermark {
        #[arg(long)]
        image: Option<String>,

        /// top-left, top-right, bottom-left, bottom-right or center
        #[arg(long)]
        position: Option<WatermarkPosition>,

        #[arg(long)]
        size_percent: Option<u32>,

        #[arg(long)]
        opacity: Option<f32>,

        #[arg(long)]
        disable: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ReplacementCommands {
    Add { old: String, new: String },
    Remove { old: String },
}

#[derive(Subcommand, Debug)]
enum SmartTemplateCommands {
    Add { artist: String, template_id: String },
    Remove { artist: String },
}

#[derive(Subcommand, Debug)]
enum AdminCommands {
    /// Grant admin rights
    Add { id: i64 },

    /// Revoke admin rights
    Remove { id: i64 },

    Block { id: i64 },

    Unblock { id: i64 },

    /// List admins and blocked users
    List,

    /// Processing statistics
    Stats,

    /// Reset processing statistics
    ResetStats,

    /// Recent action log
    Logs {
        #[arg(long)]
        errors: bool,

        #[arg(long)]
        user: Option<i64>,

        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Known users
    Users {
        /// Active within this many days
        #[arg(long, default_value = "7")]
        days: i64,

        /// Show the top N users by files processed instead
        #[arg(long)]
        top: Option<usize>,
    },

    /// Set the daily per-user limit in MB
    Limit { mb: i64 },
}

#[derive(Subcommand, Debug)]
enum DbCommands {
    /// Show database statistics
    Stats,

    /// Vacuum database (reclaim space)
    Vacuum,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration (token masked)
    Show,

    /// Generate default configuration file
    Generate {
        #[arg(short, long, default_value = "config.json")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,
}

fn parse_key_value(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {}", s))?;
    let field = key
        .trim()
        .parse::<TagField>()
        .map_err(|e| e.to_string())?;
    Ok((field.as_str().to_string(), value.to_string()))
}

/// Shared handles opened from the config
struct Context {
    config: AppConfig,
    json: bool,
}

impl Context {
    fn db(&self) -> Result<Database> {
        Database::open(&self.config.database.path)
    }

    fn admin(&self) -> Result<AdminStore> {
        AdminStore::open(Path::new(&self.config.paths.admin_data), &self.config)
    }

    fn templates(&self) -> TemplateStore {
        TemplateStore::new(self.config.templates_dir())
    }

    fn retagger(&self) -> Result<Retagger> {
        Ok(Retagger::new(self.admin()?, self.db()?.rules(), self.templates()))
    }

    fn export_dir(&self, dir: Option<PathBuf>) -> PathBuf {
        dir.unwrap_or_else(|| PathBuf::from(&self.config.paths.export_dir))
    }

    fn print<T: Serialize>(&self, value: &T, text: impl FnOnce(&T)) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            text(value);
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config = AppConfig::load(&cli.config)?;
    config.apply_env()?;

    let ctx = Context {
        config,
        json: cli.format == "json",
    };

    match cli.command {
        Commands::Tags { action } => run_tags_command(&ctx, action),
        Commands::Process { file, out } => run_process(&ctx, file, out),
        Commands::Watch {
            dir,
            out,
            process_existing,
        } => run_watch(&ctx, dir, out, process_existing).await,
        Commands::Rules { action } => run_rules_command(&ctx, action),
        Commands::Templates { action } => run_templates_command(&ctx, action),
        Commands::UserTemplates { action } => run_user_templates_command(&ctx, action),
        Commands::Settings { action } => run_settings_command(&ctx, action),
        Commands::Admin { action } => run_admin_command(&ctx, action),
        Commands::Db { action } => run_db_command(&ctx, action),
        Commands::Config { action } => run_config_command(&ctx, action, &cli.config),
        Commands::Init { dir, force } => run_init(dir, force),
    }
}

#[derive(Serialize)]
struct TagReport<'a> {
    path: String,
    file_type: AudioFormat,
    has_album_art: bool,
    tags: &'a TagSet,
}

fn print_tags(tags: &TagSet) {
    for (key, value) in tags.iter() {
        if value.contains('\n') {
            println!("  {}:", key);
            for line in value.lines() {
                println!("    {}", line);
            }
        } else {
            println!("  {}: {}", key, value);
        }
    }
}

fn run_tags_command(ctx: &Context, action: TagCommands) -> Result<()> {
    match action {
        TagCommands::Show { file } => {
            let tags = tags::read_tags(&file)?;
            let report = TagReport {
                path: file.to_string_lossy().to_string(),
                file_type: AudioFormat::from_path(&file),
                has_album_art: tags.has_album_art(),
                tags: &tags,
            };
            ctx.print(&report, |r| {
                println!("{} ({})", r.path, r.file_type);
                print_tags(r.tags);
                println!("  album art: {}", if r.has_album_art { "yes" } else { "no" });
            })?;
        }
        TagCommands::Edit {
            file,
            set,
            picture,
            lyrics_file,
            no_rules,
        } => {
            let base = tags::read_tags(&file)?;

            let mut edits: TagSet = set.into_iter().collect();
            if let Some(path) = lyrics_file {
                edits.set(TagField::Lyrics.as_str(), std::fs::read_to_string(path)?);
            }
            if let Some(path) = picture {
                edits.set_picture(Some(CoverArt::sniff(std::fs::read(path)?)));
            }

            let smart_rules = if no_rules {
                Vec::new()
            } else {
                ctx.db()?.rules().active()?
            };
            let request = MergeRequest {
                manual: Some(&edits),
                smart_rules: &smart_rules,
                ..MergeRequest::default()
            };
            let mut outcome = pipeline::merge(&base, &request);
            pipeline::normalize_lyrics(&mut outcome.tags);

            tags::write_tags(&file, &outcome.tags, &SaveOptions::default())?;

            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            ctx.print(&outcome.applied_rules, |applied| {
                println!("Saved {}", short_caption(&name));
                if applied.is_empty() {
                    println!("  No smart rules applied");
                } else {
                    println!("  Smart rules applied: {}", applied.join(", "));
                }
            })?;
        }
        TagCommands::Cover {
            file,
            output,
            thumbnail,
        } => {
            let cover = tags::extract_cover(&file)?
                .ok_or_else(|| AudioTagError::NotFound(format!("cover art in {:?}", file)))?;
            let data = if thumbnail {
                artwork::square_thumbnail(&cover.data, PREVIEW_THUMB_SIZE)?
            } else {
                cover.data
            };
            std::fs::write(&output, data)?;
            println!("Cover written to {:?}", output);
        }
    }
    Ok(())
}

fn run_process(ctx: &Context, file: PathBuf, out: Option<PathBuf>) -> Result<()> {
    let out_dir = out.unwrap_or_else(|| PathBuf::from(&ctx.config.inbox.output_dir));
    let outcome = ctx.retagger()?.process_local(&file, &out_dir)?;

    ctx.print(&outcome.merge.changed_fields, |changed| {
        println!("{} -> {}", file.display(), outcome.output.display());
        if let Some(template) = &outcome.merge.template {
            println!("  Template: {}", template);
        }
        if !outcome.merge.applied_rules.is_empty() {
            println!("  Rules: {}", outcome.merge.applied_rules.join(", "));
        }
        println!("  Changed: {}", changed.join(", "));
    })
}

async fn run_watch(
    ctx: &Context,
    dir_overrides: Vec<PathBuf>,
    out: Option<PathBuf>,
    process_existing: bool,
) -> Result<()> {
    let dirs: Vec<PathBuf> = if dir_overrides.is_empty() {
        ctx.config.inbox.watch_paths.iter().map(PathBuf::from).collect()
    } else {
        dir_overrides
    };
    let out_dir = out.unwrap_or_else(|| PathBuf::from(&ctx.config.inbox.output_dir));
    info!("Inbox directories: {:?}, output: {:?}", dirs, out_dir);

    let shutdown = inbox::shutdown_signal();
    inbox::run_inbox(ctx.retagger()?, dirs, out_dir, process_existing, shutdown).await
}

fn print_rule(rule: &SmartRule) {
    let state = if rule.is_active { "on " } else { "off" };
    println!(
        "  [{}] #{} {} (priority {}): if {} then {}",
        state,
        rule.id,
        rule.name,
        rule.priority,
        rule.condition_summary(),
        rule.action_summary()
    );
}

fn read_tag_snapshot(path: &Path) -> Result<TagSet> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn run_rules_command(ctx: &Context, action: RuleCommands) -> Result<()> {
    let store = ctx.db()?.rules();

    match action {
        RuleCommands::List { all, creator } => {
            let rules = store.list(creator, !all)?;
            ctx.print(&rules, |rules| {
                println!("Smart rules ({}):", rules.len());
                rules.iter().for_each(print_rule);
            })?;
        }
        RuleCommands::Add {
            name,
            description,
            condition_field,
            operator,
            condition_value,
            action,
            action_field,
            action_value,
            priority,
            inactive,
            creator,
        } => {
            let rule = store.create(
                &NewRule {
                    name,
                    description,
                    condition_field,
                    condition_operator: operator,
                    condition_value,
                    action_type: action,
                    action_field,
                    action_value,
                    priority,
                    is_active: !inactive,
                },
                creator,
            )?;
            ctx.print(&rule, |r| {
                println!("Created rule:");
                print_rule(r);
            })?;
        }
        RuleCommands::Remove { id } => {
            if store.delete(id)? {
                println!("Deleted rule #{}", id);
            } else {
                return Err(AudioTagError::NotFound(format!("rule {}", id)));
            }
        }
        RuleCommands::Toggle { id } => {
            let active = store.toggle(id)?;
            println!("Rule #{} is now {}", id, if active { "active" } else { "inactive" });
        }
        RuleCommands::Test { text, field } => {
            let report = rules::test_rules_on_text(&store.list(None, false)?, &text, &field);
            ctx.print(&report, |r| {
                println!("Original: {}", r.original_text);
                for step in &r.applied_rules {
                    println!("  #{} {}: {} -> {}", step.rule_id, step.rule_name, step.before, step.after);
                }
                println!("Result:   {}", r.modified_text);
                if !r.changed {
                    println!("No rule matched");
                }
            })?;
        }
        RuleCommands::TestRule { id, text, field } => {
            let rule = store
                .get(id)?
                .ok_or_else(|| AudioTagError::NotFound(format!("rule {}", id)))?;
            let field = field.unwrap_or_else(|| rule.condition_field.clone());
            let result = rules::test_rule(&rule, &text, &field);
            ctx.print(&result, |r| {
                println!("Condition: {}", r.condition);
                println!("Action:    {}", r.action);
                println!("Applied:   {}", if r.rule_applied { "yes" } else { "no" });
                println!("Result:    {}", r.modified_text);
            })?;
        }
        RuleCommands::Suggest { old, new, save } => {
            let old = read_tag_snapshot(&old)?;
            let new = read_tag_snapshot(&new)?;
            match rules::suggest_rule(&old, &new) {
                Some(suggestion) if save => {
                    let rule = store.create(&suggestion, 0)?;
                    ctx.print(&rule, |r| {
                        println!("Saved suggested rule:");
                        print_rule(r);
                    })?;
                }
                Some(suggestion) => {
                    ctx.print(&suggestion, |s| {
                        println!("Suggested rule: {}", s.name);
                        println!(
                            "  if {} {} '{}' then {} {} = '{}'",
                            s.condition_field,
                            s.condition_operator,
                            s.condition_value,
                            s.action_type,
                            s.action_field,
                            s.action_value
                        );
                    })?;
                }
                None => println!("No rule to suggest"),
            }
        }
    }
    Ok(())
}

fn template_from_file(name: &str, artist: Option<String>, from: &Path) -> Result<Template> {
    let tags = tags::read_tags(from)?;
    let artist = artist.unwrap_or_else(|| extract_artist(&tags));
    Ok(Template::from_tags(name, artist, &tags))
}

fn run_templates_command(ctx: &Context, action: TemplateCommands) -> Result<()> {
    let store = ctx.templates();

    match action {
        TemplateCommands::List { artist } => {
            let entries = store.list(artist.as_deref())?;
            ctx.print(&entries, |entries| {
                println!("Templates ({}):", entries.len());
                for e in entries {
                    println!("  {} - {} ({})", e.template.artist, e.template.name, e.id);
                }
            })?;
        }
        TemplateCommands::Artists => {
            let artists = store.artists()?;
            ctx.print(&artists, |artists| artists.iter().for_each(|a| println!("  {}", a)))?;
        }
        TemplateCommands::Show { id } => {
            let template = store
                .get(&id)?
                .ok_or_else(|| AudioTagError::NotFound(format!("template {}", id)))?;
            ctx.print(&template, |t| {
                println!("{} - {}", t.artist, t.name);
                print_tags(&t.tags);
                println!("  album art: {}", if t.album_art.is_some() { "yes" } else { "no" });
            })?;
        }
        TemplateCommands::Save { name, artist, from } => {
            let template = template_from_file(&name, artist, &from)?;
            let id = store.save(&template)?;
            println!("Saved template {}", id);
        }
        TemplateCommands::Apply { id, file } => {
            let template = store
                .get(&id)?
                .ok_or_else(|| AudioTagError::NotFound(format!("template {}", id)))?;
            let overlay_tags = template.tag_set();
            let base = tags::read_tags(&file)?;
            let request = MergeRequest {
                template: Some(TemplateOverlay {
                    name: &template.name,
                    tags: &overlay_tags,
                    protect_identity: false,
                }),
                ..MergeRequest::default()
            };
            let outcome = pipeline::merge(&base, &request);
            tags::write_tags(&file, &outcome.tags, &SaveOptions::default())?;
            ctx.print(&outcome.changed_fields, |changed| {
                println!("Applied {} to {}", template.name, file.display());
                println!("  Changed: {}", changed.join(", "));
            })?;
        }
        TemplateCommands::Delete { id } => {
            if store.delete(&id)? {
                println!("Deleted template {}", id);
            } else {
                return Err(AudioTagError::NotFound(format!("template {}", id)));
            }
        }
        TemplateCommands::Export { dir } => {
            let (path, count) = store.export_zip(&ctx.export_dir(dir))?;
            println!("Exported {} templates to {:?}", count, path);
        }
        TemplateCommands::Import { zip } => {
            let count = store.import_zip(&zip)?;
            println!("Imported {} templates", count);
        }
    }
    Ok(())
}

fn print_user_templates(templates: &[UserTemplate]) {
    println!("Templates ({}):", templates.len());
    for t in templates {
        let shared = if t.is_public { " [public]" } else { "" };
        println!("  #{} {} - {}{}", t.id, t.artist, t.name, shared);
    }
}

fn set_visibility(store: &UserTemplateStore, user: i64, id: i64, public: bool) -> Result<()> {
    if !store.share(user, id, public)? {
        return Err(AudioTagError::NotFound(format!("template {} of user {}", id, user)));
    }
    println!("Template #{} is now {}", id, if public { "public" } else { "private" });
    Ok(())
}

fn run_user_templates_command(ctx: &Context, action: UserTemplateCommands) -> Result<()> {
    let db = ctx.db()?;
    let store = db.user_templates();

    match action {
        UserTemplateCommands::List { user, artist } => {
            let templates = store.list(user, artist.as_deref())?;
            ctx.print(&templates, |t| print_user_templates(t))?;
        }
        UserTemplateCommands::Save {
            user,
            name,
            artist,
            from,
        } => {
            db.upsert_user(user, None, None)?;
            let template = template_from_file(&name, artist, &from)?;
            let id = store.save(user, &template)?;
            println!("Saved template #{} for user {}", id, user);
        }
        UserTemplateCommands::Delete { user, id } => {
            if !store.delete(user, id)? {
                return Err(AudioTagError::NotFound(format!("template {} of user {}", id, user)));
            }
            println!("Deleted template #{}", id);
        }
        UserTemplateCommands::Share { user, id } => set_visibility(&store, user, id, true)?,
        UserTemplateCommands::Unshare { user, id } => set_visibility(&store, user, id, false)?,
        UserTemplateCommands::Public { artist } => {
            let templates = store.list_public(artist.as_deref())?;
            ctx.print(&templates, |t| print_user_templates(t))?;
        }
        UserTemplateCommands::Copy { id, user, name } => {
            db.upsert_user(user, None, None)?;
            let new_id = store.copy_public(id, user, name.as_deref())?;
            println!("Copied as template #{}", new_id);
        }
        UserTemplateCommands::Export { user, dir } => {
            let (path, count) = store.export_zip(user, &ctx.export_dir(dir))?;
            println!("Exported {} templates to {:?}", count, path);
        }
        UserTemplateCommands::Import { user, zip } => {
            db.upsert_user(user, None, None)?;
            let count = store.import_zip(user, &zip)?;
            println!("Imported {} templates for user {}", count, user);
        }
    }
    Ok(())
}

fn run_settings_command(ctx: &Context, action: SettingsCommands) -> Result<()> {
    let admin = ctx.admin()?;

    match action {
        SettingsCommands::Show => {
            println!("{}", serde_json::to_string_pretty(&admin.settings()?)?);
        }
        SettingsCommands::Get { path } => match admin.get_setting(&path)? {
            Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            None => return Err(AudioTagError::NotFound(format!("setting {}", path))),
        },
        SettingsCommands::Set { path, value } => {
            let parsed = serde_json::from_str(&value).unwrap_or(serde_json::Value::String(value));
            admin.update_setting(&path, parsed)?;
            println!("Updated {}", path);
        }
        SettingsCommands::Auto { enabled } => {
            admin.set_auto_processing_enabled(enabled)?;
            println!("Auto-processing {}", if enabled { "enabled" } else { "disabled" });
        }
        SettingsCommands::Replacement { action } => match action {
            ReplacementCommands::Add { old, new } => {
                admin.add_tag_replacement(&old, &new)?;
                println!("Replacing '{}' with '{}'", old, new);
            }
            ReplacementCommands::Remove { old } => {
                if !admin.remove_tag_replacement(&old)? {
                    return Err(AudioTagError::NotFound(format!("replacement for '{}'", old)));
                }
                println!("Removed replacement for '{}'", old);
            }
        },
        SettingsCommands::SmartTemplate { action } => match action {
            SmartTemplateCommands::Add { artist, template_id } => {
                if ctx.templates().get(&template_id)?.is_none() {
                    warn!("Template {} does not exist yet", template_id);
                }
                admin.add_smart_template(&artist, &template_id)?;
                println!("{} -> {}", artist, template_id);
            }
            SmartTemplateCommands::Remove { artist } => {
                if !admin.remove_smart_template(&artist)? {
                    return Err(AudioTagError::NotFound(format!("smart template for {}", artist)));
                }
                println!("Removed smart template for {}", artist);
            }
        },
        SettingsCommands::Source { channel } => {
            admin.set_source_channel(&channel)?;
            println!("Source channel: {}", channel);
        }
        SettingsCommands::Target { channel, forward } => {
            admin.set_target_channel(&channel)?;
            if forward {
                admin.set_forward_to_target(true)?;
            }
            println!("Target channel: {}", channel);
        }
        SettingsCommands::Footer { text, disable } => {
            admin.set_tag_footer(&text, !disable)?;
            println!("Footer {}", if disable { "disabled" } else { "enabled" });
        }
        SettingsCommands::Watermark {
            image,
            position,
            size_percent,
            opacity,
            disable,
        } => {
            let mut settings = admin.watermark()?;
            if let Some(image) = image {
                settings.image_path = image;
            }
            if let Some(position) = position {
                settings.position = position;
            }
            if let Some(size) = size_percent {
                settings.size_percent = size.clamp(1, 100);
            }
            if let Some(opacity) = opacity {
                settings.opacity = opacity.clamp(0.0, 1.0);
            }
            settings.enabled = !disable && !settings.image_path.is_empty();
            admin.set_watermark(&settings)?;
            ctx.print(&settings, |s| {
                println!(
                    "Watermark {} ({}, {:?}, {}%, opacity {:.2})",
                    if s.enabled { "on" } else { "off" },
                    s.image_path,
                    s.position,
                    s.size_percent,
                    s.opacity
                );
            })?;
        }
    }
    Ok(())
}

fn print_logs(logs: &[LogEntry]) {
    for log in logs {
        println!(
            "  {} user {} {} [{:?}] {}",
            log.time.format("%Y-%m-%d %H:%M"),
            log.user_id,
            log.action,
            log.status,
            log.details
        );
    }
}

fn print_users(users: &[(i64, UserRecord)]) {
    for (id, user) in users {
        let name = if user.username.is_empty() {
            &user.first_name
        } else {
            &user.username
        };
        println!(
            "  {} {} - {} files, {:.1} MB today, last seen {}",
            id,
            name,
            user.files_processed,
            user.daily_usage,
            user.last_seen.format("%Y-%m-%d %H:%M")
        );
    }
}

fn run_admin_command(ctx: &Context, action: AdminCommands) -> Result<()> {
    let admin = ctx.admin()?;

    match action {
        AdminCommands::Add { id } => {
            admin.add_admin(id)?;
            println!("User {} is an admin", id);
        }
        AdminCommands::Remove { id } => {
            if !admin.remove_admin(id)? {
                return Err(AudioTagError::Config(format!(
                    "User {} is not a removable admin",
                    id
                )));
            }
            println!("User {} is no longer an admin", id);
        }
        AdminCommands::Block { id } => {
            admin.block_user(id)?;
            println!("Blocked {}", id);
        }
        AdminCommands::Unblock { id } => {
            admin.unblock_user(id)?;
            println!("Unblocked {}", id);
        }
        AdminCommands::List => {
            let summary = serde_json::json!({
                "admins": admin.admins()?,
                "developers": ctx.config.telegram.developer_ids,
                "blocked": admin.blocked_users()?,
            });
            ctx.print(&summary, |s| {
                println!("Admins:     {}", s["admins"]);
                println!("Developers: {}", s["developers"]);
                println!("Blocked:    {}", s["blocked"]);
            })?;
        }
        AdminCommands::Stats => {
            let stats = admin.statistics()?;
            ctx.print(&stats, |s| {
                println!("Statistics:");
                println!("  Files processed:   {}", s.total_files_processed);
                println!("  Successful edits:  {}", s.successful_edits);
                println!("  Failed operations: {}", s.failed_operations);
                println!("  Running since:     {}", s.bot_start_time.format("%Y-%m-%d %H:%M"));
                println!("  Last reset:        {}", s.last_reset_time.format("%Y-%m-%d %H:%M"));
            })?;
        }
        AdminCommands::ResetStats => {
            admin.reset_statistics()?;
            println!("Statistics reset");
        }
        AdminCommands::Logs {
            errors,
            user,
            limit,
        } => {
            let logs = match (errors, user) {
                (true, _) => admin.error_logs(limit)?,
                (false, Some(id)) => admin.logs_by_user(id, limit)?,
                (false, None) => admin.recent_logs(limit)?,
            };
            ctx.print(&logs, |l| print_logs(l))?;
        }
        AdminCommands::Users { days, top } => {
            let users = match top {
                Some(n) => admin.top_users(n)?,
                None => admin.active_users(days)?,
            };
            ctx.print(&users, |u| {
                println!("Users ({}):", u.len());
                print_users(u);
            })?;
        }
        AdminCommands::Limit { mb } => {
            admin.set_daily_user_limit(mb)?;
            println!("Daily limit: {} MB", admin.daily_user_limit()?);
        }
    }
    Ok(())
}

fn run_db_command(ctx: &Context, action: DbCommands) -> Result<()> {
    let db = ctx.db()?;

    match action {
        DbCommands::Stats => {
            let stats = db.stats()?;
            ctx.print(&stats, |s| {
                println!("Database Statistics:");
                println!("  Users: {}", s.user_count);
                println!("  Smart rules: {} ({} active)", s.rule_count, s.active_rule_count);
                println!(
                    "  User templates: {} ({} public)",
                    s.template_count, s.public_template_count
                );
            })?;
        }
        DbCommands::Vacuum => {
            db.vacuum()?;
            println!("Database vacuumed successfully");
        }
    }
    Ok(())
}

fn run_config_command(ctx: &Context, action: ConfigCommands, config_path: &Path) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            println!("{}", serde_json::to_string_pretty(&ctx.config.redacted())?);
        }
        ConfigCommands::Generate { output } => {
            AppConfig::default().save(&output)?;
            println!("Generated config at {:?}", output);
        }
        ConfigCommands::Validate => {
            let config = &ctx.config;
            println!("Configuration at {:?} is valid", config_path);
            println!(
                "  Telegram token: {}",
                if config.telegram.token.is_empty() { "missing" } else { "set" }
            );
            println!("  Database: {}", config.database.path);
            println!("  Templates: {}", config.paths.templates_dir);
            println!("  Inbox: {:?} -> {}", config.inbox.watch_paths, config.inbox.output_dir);
            if config.auto_processing.enabled && config.auto_processing.source_channel.is_empty() {
                warn!("Auto-processing is enabled but no source channel is set");
            }
        }
    }
    Ok(())
}

fn run_init(dir: Option<PathBuf>, force: bool) -> Result<()> {
    let target = dir.unwrap_or_else(|| PathBuf::from("."));
    let config_path = target.join("config.json");

    if config_path.exists() && !force {
        return Err(AudioTagError::Config(
            "config.json already exists. Use --force to overwrite".to_string(),
        ));
    }

    let mut config = AppConfig::default();
    let under = |p: &str| target.join(p).to_string_lossy().to_string();
    config.paths.temp_dir = under(&config.paths.temp_dir);
    config.paths.templates_dir = under(&config.paths.templates_dir);
    config.paths.export_dir = under(&config.paths.export_dir);
    config.paths.admin_data = under(&config.paths.admin_data);
    config.database.path = under(&config.database.path);
    config.inbox.watch_paths = vec![under("inbox")];
    config.inbox.output_dir = under("outbox");

    std::fs::create_dir_all(target.join("inbox"))?;
    config.ensure_dirs()?;
    config.save(&config_path)?;

    info!("Wrote {:?}", config_path);

    println!("audiotag initialized in {:?}", target);
    println!("\nCreated:");
    println!("  - config.json");
    println!("  - inbox/, {}, {}", config.paths.temp_dir, config.paths.templates_dir);
    println!("\nNext steps:");
    println!("  1. Set TELEGRAM_TOKEN and run audiotag-bot");
    println!("  2. Or re-tag local files: audiotag watch");

    Ok(())
}
