use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{Local, Utc};
use monitor_client::{BatchEvent, BatchEventSink, BatchPoller, MetricsRange};
use monitor_core::model::LlmConfigUpdate;
use monitor_logging::monitor_info;
use serde::Serialize;

use crate::app::App;
use crate::args::{BatchCommand, Cli, Command, ExportArgs, JobsArgs, LlmCommand, UsersCommand};
use crate::render;

/// Dashboard path equivalent to `command`; used as the return target after a forced login.
pub fn location_for(command: &Command) -> String {
    match command {
        Command::Login { .. } => "/login".to_string(),
        Command::Logout | Command::Whoami => "/".to_string(),
        Command::Jobs(args) => {
            let query = args.filters.to_view().to_query_string();
            if query.is_empty() {
                "/jobs".to_string()
            } else {
                format!("/jobs?{query}")
            }
        }
        Command::Job { job_id, .. }
        | Command::Analyze { job_id, .. }
        | Command::Metrics { job_id, .. } => format!("/jobs/{job_id}"),
        Command::Nodes { .. } => "/nodes".to_string(),
        Command::Node { node_id } => format!("/nodes/{node_id}"),
        Command::Batch(_) | Command::Export(_) => "/jobs".to_string(),
        Command::Users(_) => "/users".to_string(),
        Command::Llm(_) => "/settings".to_string(),
    }
}

pub async fn run(cli: &Cli) -> Result<()> {
    let app = App::open(cli, &location_for(&cli.command))?;
    match &cli.command {
        Command::Login { username, password } => login(&app, username, password.as_deref()).await,
        Command::Logout => {
            app.client.auth().logout()?;
            println!("Signed out.");
            Ok(())
        }
        Command::Whoami => {
            let user = app.client.auth().current_user().await?;
            output(&app, &user, || {
                format!("{} (id {})", user.username, user.id)
            })
        }
        Command::Jobs(args) => jobs(&app, args).await,
        Command::Job {
            job_id,
            no_aggregate,
            analysis,
        } => job(&app, job_id, !no_aggregate, *analysis).await,
        Command::Analyze { job_id, model } => {
            eprintln!("Analyzing {job_id}; this can take a few minutes...");
            let result = app.client.jobs().analyze(job_id, model.as_deref()).await?;
            print_json(&result)
        }
        Command::Metrics {
            job_id,
            latest,
            start,
            end,
            limit,
        } => {
            if *latest {
                let sample = app.client.metrics().latest(job_id).await?;
                return print_json(&sample);
            }
            let range = MetricsRange {
                start_time: *start,
                end_time: *end,
                limit: *limit,
            };
            let samples = app.client.metrics().history(job_id, range).await?;
            print_json(&samples)
        }
        Command::Nodes { status, stats } => {
            if *stats {
                let stats = app.client.nodes().stats().await?;
                return output(&app, &stats, || render::node_stats(&stats));
            }
            let nodes = app.client.nodes().list(status.as_deref()).await?;
            output(&app, &nodes, || render::nodes(&nodes, Utc::now()))
        }
        Command::Node { node_id } => {
            let node = app.client.nodes().get(node_id).await?;
            output(&app, &node, || render::nodes(std::slice::from_ref(&node), Utc::now()))
        }
        Command::Batch(command) => batch(&app, command).await,
        Command::Export(args) => export(&app, args).await,
        Command::Users(command) => users(&app, command).await,
        Command::Llm(command) => llm(&app, command).await,
    }
}

async fn login(app: &App, username: &str, password: Option<&str>) -> Result<()> {
    let password = match password {
        Some(password) => password.to_string(),
        None => prompt("Password")?,
    };
    let response = app.client.auth().login(username, &password).await?;
    println!("Signed in as {}.", response.username);
    if let Some(path) = app.navigator.take_return_path() {
        println!("You were at {path} when the previous session expired.");
    }
    Ok(())
}

async fn jobs(app: &App, args: &JobsArgs) -> Result<()> {
    if args.stats {
        let stats = app.client.jobs().stats().await?;
        return output(app, &stats, || render::job_stats(&stats));
    }
    let view = args.filters.to_view();
    if args.grouped {
        let page = app.client.jobs().grouped(&view).await?;
        return output(app, &page, || render::groups(&page));
    }
    let page = app.client.jobs().list(&view).await?;
    output(app, &page, || render::jobs(&page))
}

async fn job(app: &App, job_id: &str, aggregate: bool, with_analysis: bool) -> Result<()> {
    let detail = app.client.jobs().get(job_id, aggregate).await?;
    if app.json {
        print_json(&detail)?;
    } else {
        let job = &detail.job;
        println!("{}", render::job_row(job));
        println!("  command   {}", job.command_line.as_deref().unwrap_or("-"));
        println!("  cwd       {}", job.cwd.as_deref().unwrap_or("-"));
        println!("  ended     {}", render::millis(job.end_time));
        println!("  npu cards {}", detail.npu_cards.len());
        if !detail.related_jobs.is_empty() {
            println!("  related:");
            for related in &detail.related_jobs {
                println!("    {}", render::job_row(related));
            }
        }
    }
    if with_analysis {
        let analysis = app.client.jobs().analysis(job_id).await?;
        print_json(&analysis)?;
    }
    Ok(())
}

/// Prints batch events as they arrive.
struct ConsoleSink;

impl BatchEventSink for ConsoleSink {
    fn emit(&self, event: BatchEvent) {
        match event {
            BatchEvent::Progress(progress) => eprintln!("{}", render::progress(&progress)),
            BatchEvent::Finished(progress) => {
                println!("{}", render::progress(&progress));
                if let Some(failures) = render::failures(&progress) {
                    println!("{failures}");
                }
            }
            BatchEvent::Abandoned { batch_id } => {
                eprintln!("Lost track of batch {batch_id}; its progress could not be fetched.")
            }
        }
    }
}

async fn batch(app: &App, command: &BatchCommand) -> Result<()> {
    let poller = BatchPoller::new(app.client.clone(), app.tab.clone(), Arc::new(ConsoleSink));
    match command {
        BatchCommand::Run { job_ids, detach } => {
            let batch_id = poller.submit(job_ids).await?;
            println!("Submitted batch {batch_id} ({} jobs).", job_ids.len());
            if *detach {
                poller.stop();
                return Ok(());
            }
            follow(&poller).await?;
        }
        BatchCommand::Resume => {
            if poller.recover().await.is_none() {
                println!("No batch analysis in progress.");
                return Ok(());
            }
            follow(&poller).await?;
        }
        BatchCommand::Cancel => {
            poller.recover().await;
            if poller.batch_id().is_none() {
                println!("No batch analysis in progress.");
                return Ok(());
            }
            poller.cancel().await;
            follow(&poller).await?;
        }
    }
    if app.json {
        if let Some(progress) = poller.progress() {
            print_json(&progress)?;
        }
    }
    Ok(())
}

async fn follow(poller: &BatchPoller) -> Result<()> {
    tokio::select! {
        _ = poller.wait_until_idle() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            poller.shutdown().await;
            eprintln!("Detached. Run `task-monitor batch resume` to keep following.");
        }
    }
    Ok(())
}

async fn export(app: &App, args: &ExportArgs) -> Result<()> {
    let view = args.filters.to_view();
    let csv = app
        .client
        .jobs()
        .export_analyses_csv(&view, &args.export_scope())
        .await?;
    let path = args.output.clone().unwrap_or_else(|| {
        PathBuf::from(format!(
            "analysis-overview-{}.csv",
            Local::now().format("%Y%m%d-%H%M%S")
        ))
    });
    std::fs::write(&path, &csv).with_context(|| format!("cannot write {path:?}"))?;
    monitor_info!("Exported {} bytes to {:?}", csv.len(), path);
    println!("Wrote {}", path.display());
    Ok(())
}

async fn users(app: &App, command: &UsersCommand) -> Result<()> {
    let auth = app.client.auth();
    match command {
        UsersCommand::List => {
            let users = auth.list_users().await?;
            output(app, &users, || render::users(&users))
        }
        UsersCommand::Add { username, password } => {
            let password = password_or_prompt(password.as_deref())?;
            let user = auth.create_user(username, &password).await?;
            println!("Created user {} (id {}).", user.username, user.id);
            Ok(())
        }
        UsersCommand::Passwd { user_id, password } => {
            let password = password_or_prompt(password.as_deref())?;
            auth.change_password(*user_id, &password).await?;
            println!("Password changed.");
            Ok(())
        }
        UsersCommand::Remove { user_id } => {
            auth.delete_user(*user_id).await?;
            println!("Deleted user {user_id}.");
            Ok(())
        }
    }
}

async fn llm(app: &App, command: &LlmCommand) -> Result<()> {
    match command {
        LlmCommand::Show => {
            let mut config = app.client.config().llm().await?;
            if !config.api_key.is_empty() {
                config.api_key = "********".to_string();
            }
            print_json(&config)
        }
        LlmCommand::Set {
            enabled,
            endpoint,
            api_key,
            model,
            timeout,
        } => {
            let update = LlmConfigUpdate {
                enabled: *enabled,
                endpoint: endpoint.clone(),
                api_key: api_key.clone(),
                model: model.clone(),
                timeout: *timeout,
            };
            if update == LlmConfigUpdate::default() {
                bail!("nothing to update; pass at least one setting");
            }
            app.client.config().update_llm(&update).await?;
            println!("LLM settings updated.");
            Ok(())
        }
    }
}

fn output<T: Serialize>(app: &App, value: &T, table: impl FnOnce() -> String) -> Result<()> {
    if app.json {
        print_json(value)
    } else {
        println!("{}", table());
        Ok(())
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn password_or_prompt(password: Option<&str>) -> Result<String> {
    match password {
        Some(password) => Ok(password.to_string()),
        None => prompt("New password"),
    }
}

fn prompt(label: &str) -> Result<String> {
    eprint!("{label}: ");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let value = line.trim_end_matches(['\r', '\n']).to_string();
    if value.is_empty() {
        bail!("{} must not be empty", label.to_lowercase());
    }
    Ok(value)
}
