use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "quire",
    about = "Quire: Git working copies as buffer stores with object indexes",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Working copy to operate on
    #[arg(short = 'C', long = "repo", global = true, default_value = ".")]
    pub repo: PathBuf,

    /// Configuration file
    #[arg(long, global = true, default_value = "quire.toml")]
    pub config: PathBuf,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create an empty working copy
    Init(InitArgs),
    /// Clone a remote into a new working copy
    Clone(CloneArgs),
    /// Fast-forward from origin
    Pull(AuthArgs),
    /// Push the current branch to origin
    Push(AuthArgs),
    /// Manage the origin remote
    Remote(RemoteArgs),
    /// Show session status and changes against origin
    Status(StatusArgs),
    /// List buffer paths
    Ls(LsArgs),
    /// Print one buffer
    Cat(CatArgs),
    /// Write files into buffers as one commit
    Import(ImportArgs),
    /// Delete a subtree as one commit
    Rm(RmArgs),
    /// Move a subtree as one commit
    Mv(MvArgs),
    /// Commit every outstanding working-tree change
    Commit(CommitArgs),
    /// Throw away uncommitted changes
    Discard(DiscardArgs),
    /// Print the current commit
    Head,
    /// List buffers changed between two commits
    Changes(ChangesArgs),
    /// Query JSON objects of a dataset
    Query(QueryArgs),
    /// Delete the working copy from disk
    Destroy,
    /// Print the effective configuration
    Config,
}

#[derive(Args)]
pub struct InitArgs {
    #[arg(short, long)]
    pub branch: Option<String>,
}

#[derive(Args)]
pub struct AuthArgs {
    #[arg(long)]
    pub username: Option<String>,
    #[arg(long)]
    pub password: Option<String>,
}

#[derive(Args)]
pub struct CloneArgs {
    pub url: String,
    #[arg(short, long)]
    pub branch: Option<String>,
    #[command(flatten)]
    pub auth: AuthArgs,
}

#[derive(Args)]
pub struct RemoteArgs {
    #[command(subcommand)]
    pub action: RemoteAction,
}

#[derive(Subcommand)]
pub enum RemoteAction {
    /// Set the origin URL
    Add { url: String },
    /// Remove origin
    Remove,
    /// Inspect a remote without cloning it
    Describe {
        url: String,
        #[command(flatten)]
        auth: AuthArgs,
    },
}

#[derive(Args)]
pub struct StatusArgs {
    /// Also list every buffer with its sync status
    #[arg(short, long)]
    pub all: bool,
}

#[derive(Args)]
pub struct LsArgs {
    /// Directory to list; the whole tree with --recursive
    pub prefix: Option<String>,
    #[arg(short, long)]
    pub recursive: bool,
    /// Only files whose content contains this text
    #[arg(long)]
    pub grep: Option<String>,
}

#[derive(Args)]
pub struct CatArgs {
    pub path: String,
    /// Read as of this commit
    #[arg(long)]
    pub at: Option<String>,
}

#[derive(Args)]
pub struct MessageArgs {
    #[arg(short, long)]
    pub message: String,
    #[arg(long)]
    pub author_name: Option<String>,
    #[arg(long)]
    pub author_email: Option<String>,
}

#[derive(Args)]
pub struct ImportArgs {
    /// `SOURCE=BUFFER` pairs
    #[arg(required = true)]
    pub mappings: Vec<String>,
    #[command(flatten)]
    pub commit: MessageArgs,
}

#[derive(Args)]
pub struct RmArgs {
    pub root: String,
    #[command(flatten)]
    pub commit: MessageArgs,
}

#[derive(Args)]
pub struct MvArgs {
    pub from: String,
    pub to: String,
    #[command(flatten)]
    pub commit: MessageArgs,
}

#[derive(Args)]
pub struct CommitArgs {
    #[command(flatten)]
    pub commit: MessageArgs,
}

#[derive(Args)]
pub struct DiscardArgs {
    pub path: Option<String>,
}

#[derive(Args)]
pub struct ChangesArgs {
    /// Older commit; omit to compare against the empty tree
    #[arg(long)]
    pub from: Option<String>,
    /// Newer commit; defaults to HEAD
    #[arg(long)]
    pub to: Option<String>,
    #[arg(long)]
    pub root: Option<String>,
}

#[derive(Args)]
pub struct QueryArgs {
    /// Dataset directory
    pub dataset: String,
    /// Filter expression over `obj` and `objPath`
    pub query: String,
    /// Sort-key expression
    #[arg(long)]
    pub sort: Option<String>,
    /// Print decoded objects, not just paths
    #[arg(long)]
    pub show: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::try_parse_from(["quire", "init"]).unwrap();
        assert!(matches!(cli.command, Command::Init(_)));
        assert_eq!(cli.repo, PathBuf::from("."));
    }

    #[test]
    fn parse_init_branch_and_repo() {
        let cli = Cli::try_parse_from(["quire", "-C", "/tmp/wc", "init", "--branch", "trunk"]).unwrap();
        assert_eq!(cli.repo, PathBuf::from("/tmp/wc"));
        if let Command::Init(args) = cli.command {
            assert_eq!(args.branch, Some("trunk".into()));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_clone() {
        let cli = Cli::try_parse_from(["quire", "clone", "https://x/y", "--username", "ada"]).unwrap();
        if let Command::Clone(args) = cli.command {
            assert_eq!(args.url, "https://x/y");
            assert_eq!(args.auth.username, Some("ada".into()));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_import() {
        let cli = Cli::try_parse_from(["quire", "import", "/tmp/a.png=img/a.png", "-m", "add image"]).unwrap();
        if let Command::Import(args) = cli.command {
            assert_eq!(args.mappings, vec!["/tmp/a.png=img/a.png"]);
            assert_eq!(args.commit.message, "add image");
        } else { panic!("wrong command"); }
    }

    #[test]
    fn commit_requires_message() {
        assert!(Cli::try_parse_from(["quire", "rm", "docs"]).is_err());
    }

    #[test]
    fn parse_mv() {
        let cli = Cli::try_parse_from(["quire", "mv", "a", "b", "-m", "rename"]).unwrap();
        if let Command::Mv(args) = cli.command {
            assert_eq!((args.from.as_str(), args.to.as_str()), ("a", "b"));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_remote_describe() {
        let cli = Cli::try_parse_from(["quire", "remote", "describe", "https://x"]).unwrap();
        if let Command::Remote(args) = cli.command {
            assert!(matches!(args.action, RemoteAction::Describe { .. }));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_query() {
        let cli = Cli::try_parse_from(["quire", "query", "items", "obj.t == 1", "--sort", "obj.title"]).unwrap();
        if let Command::Query(args) = cli.command {
            assert_eq!(args.query, "obj.t == 1");
            assert_eq!(args.sort, Some("obj.title".into()));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_verbose_json() {
        let cli = Cli::try_parse_from(["quire", "--verbose", "--format", "json", "head"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.format, OutputFormat::Json));
    }
}
