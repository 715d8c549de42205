use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use monitor_client::{ExportScope, BASE_URL_ENV};
use monitor_core::{JobListView, SortOrder};
use monitor_logging::{LogDestination, DEFAULT_LOG_FILE};

#[derive(Parser, Debug)]
#[command(name = "task-monitor")]
#[command(version)]
#[command(about = "Command line client for the cluster job monitoring API")]
#[command(propagate_version = true)]
pub struct Cli {
    /// API root, e.g. http://host:8080/api/v1
    #[arg(long, global = true, env = BASE_URL_ENV)]
    pub base_url: Option<String>,

    /// Directory holding the saved session and the in-flight batch id
    #[arg(long, global = true, env = "TASK_MONITOR_STATE_DIR", default_value = ".task-monitor")]
    pub state_dir: PathBuf,

    /// Print raw JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    /// Log verbosity
    #[arg(long, global = true, value_enum, default_value = "warn")]
    pub log_level: LogLevel,

    /// Where logs go; defaults to the terminal, or to both when `--log-file` is given
    #[arg(long, global = true, value_enum)]
    pub log_to: Option<LogTarget>,

    /// Log file path, `./monitor.log` unless given
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogTarget {
    Terminal,
    File,
    Both,
}

impl Cli {
    pub fn log_destination(&self) -> LogDestination {
        let file = || {
            self.log_file
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE))
        };
        match (self.log_to, &self.log_file) {
            (None, None) | (Some(LogTarget::Terminal), _) => LogDestination::Terminal,
            (None, Some(path)) => LogDestination::Both(path.clone()),
            (Some(LogTarget::File), _) => LogDestination::File(file()),
            (Some(LogTarget::Both), _) => LogDestination::Both(file()),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sign in and save the session
    Login {
        #[arg(long, short = 'u')]
        username: String,
        /// Read from stdin when omitted
        #[arg(long, env = "TASK_MONITOR_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Forget the saved session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// List jobs
    Jobs(JobsArgs),
    /// Show one job
    Job {
        job_id: String,
        /// Show the raw process instead of the aggregated main job
        #[arg(long)]
        no_aggregate: bool,
        /// Include the stored AI analysis
        #[arg(long)]
        analysis: bool,
    },
    /// Run AI analysis for one job and wait for the result
    Analyze {
        job_id: String,
        #[arg(long)]
        model: Option<String>,
    },
    /// Job metrics
    Metrics {
        job_id: String,
        /// Only the most recent sample
        #[arg(long)]
        latest: bool,
        /// Start of the range, unix milliseconds
        #[arg(long)]
        start: Option<i64>,
        /// End of the range, unix milliseconds
        #[arg(long)]
        end: Option<i64>,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// List nodes
    Nodes {
        #[arg(long)]
        status: Option<String>,
        /// Show node counts instead of the list
        #[arg(long)]
        stats: bool,
    },
    /// Show one node
    Node { node_id: String },
    /// Batch AI analysis
    #[command(subcommand)]
    Batch(BatchCommand),
    /// Download the analysis overview as CSV
    Export(ExportArgs),
    /// User administration
    #[command(subcommand)]
    Users(UsersCommand),
    /// LLM settings used for analysis
    #[command(subcommand)]
    Llm(LlmCommand),
}

#[derive(Args, Debug, Default)]
pub struct FilterArgs {
    /// Start from a saved list query, e.g. "status=running&page=2"
    #[arg(long)]
    pub query: Option<String>,
    #[arg(long)]
    pub status: Vec<String>,
    #[arg(long = "type")]
    pub job_type: Vec<String>,
    #[arg(long)]
    pub framework: Vec<String>,
    /// Card count; "unknown" matches jobs without one
    #[arg(long)]
    pub card_count: Vec<String>,
    #[arg(long)]
    pub node: Option<String>,
    #[arg(long)]
    pub sort_by: Option<String>,
    #[arg(long, value_enum)]
    pub order: Option<SortArg>,
    #[arg(long)]
    pub page: Option<u32>,
    #[arg(long)]
    pub page_size: Option<u32>,
}

impl FilterArgs {
    /// Apply the flags on top of `--query`. Filters set here reset the page unless `--page` is given.
    pub fn to_view(&self) -> JobListView {
        let mut view = self
            .query
            .as_deref()
            .map(JobListView::from_query)
            .unwrap_or_default();
        if !self.status.is_empty() {
            view.set_status(self.status.clone());
        }
        if !self.job_type.is_empty() {
            view.set_job_type(self.job_type.clone());
        }
        if !self.framework.is_empty() {
            view.set_framework(self.framework.clone());
        }
        if !self.card_count.is_empty() {
            view.set_card_count(self.card_count.clone());
        }
        if let Some(node) = &self.node {
            view.set_node_id(Some(node.clone()));
        }
        if let Some(sort_by) = &self.sort_by {
            let order = self.order.map(SortOrder::from).unwrap_or_default();
            view.set_sort(Some(sort_by.clone()), order);
        }
        if let Some(page_size) = self.page_size {
            view.set_page_size(page_size);
        }
        if let Some(page) = self.page {
            view.set_page(page);
        }
        view
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SortArg {
    Asc,
    Desc,
}

impl From<SortArg> for SortOrder {
    fn from(order: SortArg) -> Self {
        match order {
            SortArg::Asc => SortOrder::Asc,
            SortArg::Desc => SortOrder::Desc,
        }
    }
}

#[derive(Args, Debug)]
pub struct JobsArgs {
    #[command(flatten)]
    pub filters: FilterArgs,
    /// One row per main process with its children folded in
    #[arg(long)]
    pub grouped: bool,
    /// Show job counts by status instead of the list
    #[arg(long)]
    pub stats: bool,
}

#[derive(Subcommand, Debug)]
pub enum BatchCommand {
    /// Submit jobs and follow progress until the batch finishes
    Run {
        #[arg(required = true)]
        job_ids: Vec<String>,
        /// Return right after submission; use `batch resume` to follow
        #[arg(long)]
        detach: bool,
    },
    /// Follow the batch submitted earlier from this state directory
    Resume,
    /// Ask the server to stop the batch in progress
    Cancel,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ScopeArg {
    Filtered,
    Page,
    Selected,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    #[arg(long, value_enum, default_value = "filtered")]
    pub scope: ScopeArg,
    /// Job ids for `--scope selected`
    #[arg(long = "id")]
    pub ids: Vec<String>,
    #[command(flatten)]
    pub filters: FilterArgs,
    /// Output file; defaults to a timestamped name in the current directory
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

impl ExportArgs {
    pub fn export_scope(&self) -> ExportScope {
        match self.scope {
            ScopeArg::Filtered => ExportScope::Filtered,
            ScopeArg::Page => ExportScope::Page,
            ScopeArg::Selected => ExportScope::Selected(self.ids.clone()),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum UsersCommand {
    List,
    Add {
        username: String,
        #[arg(long, env = "TASK_MONITOR_NEW_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    Passwd {
        user_id: u64,
        #[arg(long, env = "TASK_MONITOR_NEW_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    Remove {
        user_id: u64,
    },
}

#[derive(Subcommand, Debug)]
pub enum LlmCommand {
    Show,
    Set {
        #[arg(long)]
        enabled: Option<bool>,
        #[arg(long)]
        endpoint: Option<String>,
        #[arg(long, env = "TASK_MONITOR_LLM_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
        #[arg(long)]
        model: Option<String>,
        /// Seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
}
