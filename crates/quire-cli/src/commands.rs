use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use colored::Colorize;
use quire_sdk::{
    Author, BufferPath, ChangeStatus, CommitHash, CommitOutcome, GitAuthentication, JsonObjectSpec, ObjectSpec,
    Quire, QuireConfig, RepoStatus,
};
use serde::Serialize;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = QuireConfig::load(&cli.config)
        .with_context(|| format!("reading {}", cli.config.display()))?;
    let quire = Quire::new(config);
    let out = Output { format: cli.format };

    let result = execute(&quire, &cli.repo, cli.command, &out).await;
    quire.destroy();
    result
}

async fn execute(quire: &Quire, repo: &Path, command: Command, out: &Output) -> anyhow::Result<()> {
    match command {
        Command::Init(args) => cmd_init(quire, repo, args).await,
        Command::Clone(args) => cmd_clone(quire, repo, args).await,
        Command::Pull(args) => cmd_pull(quire, repo, args, out).await,
        Command::Push(args) => {
            quire.git_push(repo, auth(args)).await?;
            println!("{} Pushed to origin", "✓".green().bold());
            Ok(())
        }
        Command::Remote(args) => cmd_remote(quire, repo, args, out).await,
        Command::Status(args) => cmd_status(quire, repo, args, out).await,
        Command::Ls(args) => cmd_ls(quire, repo, args, out).await,
        Command::Cat(args) => cmd_cat(quire, repo, args).await,
        Command::Import(args) => cmd_import(quire, repo, args, out).await,
        Command::Rm(args) => {
            let author = author(quire.config(), &args.commit)?;
            let outcome = quire
                .repo_delete_tree(repo, author, &args.commit.message, buffer_path(&args.root)?)
                .await?;
            print_outcome(out, &outcome)
        }
        Command::Mv(args) => {
            let author = author(quire.config(), &args.commit)?;
            let outcome = quire
                .repo_move_tree(repo, author, &args.commit.message, buffer_path(&args.from)?, buffer_path(&args.to)?)
                .await?;
            print_outcome(out, &outcome)
        }
        Command::Commit(args) => {
            let author = author(quire.config(), &args.commit)?;
            let outcome = quire
                .repo_commit_outstanding_changes(repo, author, &args.commit.message)
                .await?;
            print_outcome(out, &outcome)
        }
        Command::Discard(args) => {
            let spec = args.path.as_deref().map(buffer_path).transpose()?;
            quire.git_discard_uncommitted_changes(repo, spec).await?;
            println!("{} Discarded uncommitted changes", "✓".green().bold());
            Ok(())
        }
        Command::Head => {
            let head = quire.repo_get_current_commit(repo).await?;
            out.value(&head, || println!("{}", head.to_hex().yellow()))
        }
        Command::Changes(args) => cmd_changes(quire, repo, args, out).await,
        Command::Query(args) => cmd_query(quire, repo, args, out).await,
        Command::Destroy => {
            quire.git_delete(repo).await?;
            println!("{} Deleted {}", "✓".green().bold(), repo.display());
            Ok(())
        }
        Command::Config => {
            print!("{}", quire.config().to_toml_string()?);
            Ok(())
        }
    }
}

struct Output {
    format: OutputFormat,
}

impl Output {
    /// Print `value` as JSON, or run `text` for human output.
    fn value<T: Serialize>(&self, value: &T, text: impl FnOnce()) -> anyhow::Result<()> {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
            OutputFormat::Text => text(),
        }
        Ok(())
    }
}

fn buffer_path(raw: &str) -> anyhow::Result<BufferPath> {
    BufferPath::parse_root(raw).map_err(|e| anyhow!("invalid buffer path {raw:?}: {e}"))
}

fn commit(raw: &str) -> anyhow::Result<CommitHash> {
    raw.parse().map_err(|e| anyhow!("invalid commit {raw:?}: {e}"))
}

fn auth(args: AuthArgs) -> GitAuthentication {
    GitAuthentication {
        username: args.username,
        password: args.password,
    }
}

/// Author from the flags, falling back to the `[author]` config section.
fn author(config: &QuireConfig, args: &MessageArgs) -> anyhow::Result<Author> {
    let name = args.author_name.clone().or_else(|| config.author.name.clone());
    let email = args.author_email.clone().or_else(|| config.author.email.clone());
    match (name, email) {
        (Some(name), Some(email)) => Ok(Author::new(name, email)),
        _ => bail!("no author: pass --author-name/--author-email or set [author] in the config file"),
    }
}

fn print_outcome(out: &Output, outcome: &CommitOutcome) -> anyhow::Result<()> {
    out.value(outcome, || {
        if let Some(hash) = &outcome.new_commit_hash {
            println!("{} Committed {}", "✓".green().bold(), hash.short_hex().yellow());
        } else if outcome.has_conflicts() {
            println!("{} Conflicts:", "✗".red().bold());
            for path in &outcome.conflicts {
                println!("  {}", path.to_string().red());
            }
        } else {
            println!("Nothing to commit.");
        }
    })
}

fn status_marker(status: ChangeStatus) -> colored::ColoredString {
    match status {
        ChangeStatus::Added => "A".green(),
        ChangeStatus::Modified => "M".yellow(),
        ChangeStatus::Removed => "D".red(),
        ChangeStatus::Unchanged => " ".normal(),
    }
}

async fn cmd_init(quire: &Quire, repo: &Path, args: InitArgs) -> anyhow::Result<()> {
    quire.git_init(repo, args.branch.as_deref()).await?;
    let branch = args.branch.as_deref().unwrap_or(quire.config().remote.default_branch.as_str());
    println!("{} Initialized empty working copy in {}", "✓".green().bold(), repo.display().to_string().bold());
    println!("  Branch: {}", branch.yellow());
    Ok(())
}

async fn cmd_clone(quire: &Quire, repo: &Path, args: CloneArgs) -> anyhow::Result<()> {
    let mut stream = quire.stream_status(repo)?;
    let progress = tokio::spawn(async move {
        while let Ok(status) = stream.recv().await {
            if let RepoStatus::Busy(busy) = status {
                if let Some(p) = busy.progress {
                    let total = p.total.map(|t| t.to_string()).unwrap_or_else(|| "?".into());
                    eprintln!("  {} {}/{}", p.phase.dimmed(), p.loaded, total);
                }
            }
        }
    });

    let result = quire
        .git_clone(repo, &args.url, auth(args.auth), args.branch.as_deref())
        .await;
    progress.abort();
    result?;
    println!("{} Cloned {} into {}", "✓".green().bold(), args.url.blue(), repo.display());
    Ok(())
}

async fn cmd_pull(quire: &Quire, repo: &Path, args: AuthArgs, out: &Output) -> anyhow::Result<()> {
    let result = quire.git_pull(repo, auth(args)).await?;
    out.value(&result, || match (result.changed(), &result.oid_after_pull) {
        (true, Some(after)) => {
            let before = result
                .oid_before_pull
                .map(|h| h.short_hex())
                .unwrap_or_else(|| "(none)".into());
            println!("{} Fast-forwarded {}..{}", "✓".green().bold(), before.dimmed(), after.short_hex().yellow());
        }
        _ => println!("Already up to date."),
    })
}

async fn cmd_remote(quire: &Quire, repo: &Path, args: RemoteArgs, out: &Output) -> anyhow::Result<()> {
    match args.action {
        RemoteAction::Add { url } => {
            quire.git_add_origin(repo, &url).await?;
            println!("Set origin → {}", url.blue());
            Ok(())
        }
        RemoteAction::Remove => {
            quire.git_delete_origin(repo).await?;
            println!("Removed origin");
            Ok(())
        }
        RemoteAction::Describe { url, auth: creds } => {
            let description = quire.git_describe_remote(&url, auth(creds)).await?;
            out.value(&description, || {
                if description.is_blank {
                    println!("{} is empty", url.blue());
                    return;
                }
                let main = description.main_branch_name.as_deref().unwrap_or("?");
                for branch in &description.available_branches {
                    let marker = if branch == main { "*".green().bold() } else { " ".normal() };
                    println!("{marker} {branch}");
                }
                let access = if description.can_push { "read-write".green() } else { "read-only".yellow() };
                println!("Access: {access}");
            })
        }
    }
}

async fn cmd_status(quire: &Quire, repo: &Path, args: StatusArgs, out: &Output) -> anyhow::Result<()> {
    let head = quire.repo_get_current_commit(repo).await.ok();
    let changes = quire.repo_list_all_buffer_paths_with_sync_status(repo).await?;

    #[derive(Serialize)]
    struct Report<'a> {
        status: RepoStatus,
        head: Option<CommitHash>,
        changes: &'a BTreeMap<BufferPath, ChangeStatus>,
    }
    let report = Report {
        status: quire.repo_status(repo),
        head,
        changes: &changes,
    };

    out.value(&report, || {
        match head {
            Some(head) => println!("HEAD {}", head.short_hex().yellow().bold()),
            None => println!("HEAD {}", "(no commits)".dimmed()),
        }
        let pending: Vec<_> = changes
            .iter()
            .filter(|(_, s)| args.all || **s != ChangeStatus::Unchanged)
            .collect();
        if pending.is_empty() {
            println!("\nUp to date with origin.");
        }
        for (path, status) in pending {
            println!("  {} {}", status_marker(*status), path);
        }
    })
}

async fn cmd_ls(quire: &Quire, repo: &Path, args: LsArgs, out: &Output) -> anyhow::Result<()> {
    let paths = if args.recursive {
        let prefix = args.prefix.as_deref().map(buffer_path).transpose()?;
        let all = quire.repo_list_all_buffer_paths(repo).await?;
        match prefix {
            Some(prefix) => all.into_iter().filter(|p| p.is_within(&prefix)).collect(),
            None => all,
        }
    } else {
        let prefix = buffer_path(args.prefix.as_deref().unwrap_or(""))?;
        quire.repo_list_directory(repo, prefix, args.grep).await?
    };
    out.value(&paths, || {
        for path in &paths {
            println!("{path}");
        }
    })
}

async fn cmd_cat(quire: &Quire, repo: &Path, args: CatArgs) -> anyhow::Result<()> {
    let path = buffer_path(&args.path)?;
    let content = match args.at.as_deref() {
        Some(at) => quire
            .repo_read_buffers_at_version(repo, path.clone(), commit(at)?)
            .await?
            .remove(&path),
        None => quire
            .repo_get_buffer_dataset(repo, vec![path.clone()])
            .await?
            .remove(&path)
            .flatten(),
    };
    let content = content.ok_or_else(|| anyhow!("no buffer at {path}"))?;
    print!("{}", String::from_utf8_lossy(&content));
    Ok(())
}

async fn cmd_import(quire: &Quire, repo: &Path, args: ImportArgs, out: &Output) -> anyhow::Result<()> {
    let mut sources = BTreeMap::new();
    for mapping in &args.mappings {
        let (source, target) = mapping
            .split_once('=')
            .ok_or_else(|| anyhow!("expected SOURCE=BUFFER, got {mapping:?}"))?;
        let source = std::fs::canonicalize(source).with_context(|| format!("reading {source}"))?;
        sources.insert(source, buffer_path(target)?);
    }
    let author = author(quire.config(), &args.commit)?;
    let outcome = quire
        .repo_add_external_buffers(repo, author, &args.commit.message, sources)
        .await?;
    print_outcome(out, &outcome)
}

async fn cmd_changes(quire: &Quire, repo: &Path, args: ChangesArgs, out: &Output) -> anyhow::Result<()> {
    let before = args.from.as_deref().map(commit).transpose()?;
    let after = match args.to.as_deref() {
        Some(to) => commit(to)?,
        None => quire.repo_get_current_commit(repo).await?,
    };
    let root = args.root.as_deref().map(buffer_path).transpose()?.unwrap_or_else(BufferPath::root);
    let changes = quire.repo_resolve_changes(repo, root, before, after).await?;
    out.value(&changes, || {
        for (path, status) in &changes {
            println!("  {} {}", status_marker(*status), path);
        }
    })
}

async fn cmd_query(quire: &Quire, repo: &Path, args: QueryArgs, out: &Output) -> anyhow::Result<()> {
    let specs: Vec<Arc<dyn ObjectSpec>> = vec![Arc::new(JsonObjectSpec::new())];
    let dataset = quire.ds_load(repo, buffer_path(&args.dataset)?, specs).await?;
    let id = quire.ds_index_get_or_create(&dataset, &args.query, args.sort.as_deref())?;
    let status = quire.ds_index_wait(&dataset, Some(&id)).await?;

    let mut paths = Vec::with_capacity(status.object_count);
    for position in 0..status.object_count {
        if let Some(path) = quire.ds_index_get_object(&dataset, Some(&id), position)? {
            paths.push(path);
        }
    }

    if args.show {
        let objects = quire.ds_read_objects(&dataset, &paths).await?;
        let ordered: Vec<_> = paths.iter().map(|p| (p, objects.get(p).cloned().flatten())).collect();
        return out.value(&ordered, || {
            for (path, value) in &ordered {
                let value = value.as_ref().map(|v| v.to_string()).unwrap_or_default();
                println!("{}  {}", path.to_string().bold(), value);
            }
        });
    }
    out.value(&paths, || {
        for path in &paths {
            println!("{path}");
        }
        if !status.complete {
            eprintln!("{}", "(index incomplete)".yellow());
        }
    })
}
