//! Reply rendering

use std::time::Duration;

use chrono::Utc;

use crate::chat::command::Button;
use crate::chat::reply::Reply;
use crate::control::service::{RestartOutcome, Stats, StopOutcome};
use crate::deploy::fsm::DeploymentStatus;
use crate::errors::BotError;
use crate::intake::controller::{Step, Warning};
use crate::intake::session::{DraftSummary, Stage};
use crate::intake::validate::ENTRY_POINTS;
use crate::models::deployment::{Deployment, LogEntry};
use crate::telemetry::ProcessMetrics;
use crate::utils::format_uptime;

/// Log entries shown by `/logs`
pub const LOGS_LIMIT: usize = 20;

/// Log entries shown on a status card
pub const STATUS_LOGS_LIMIT: usize = 5;

/// Bot buttons shown under `/mybots`
const LIST_BUTTONS: usize = 5;

/// Replies longer than this are cut
const MAX_REPLY_CHARS: usize = 4000;
const LOGS_TRUNCATED: &str = "... (earlier logs truncated)\n";

fn button(reply: Reply, label: &str, button: Button) -> Reply {
    reply.with_action(label, button.data())
}

pub fn status_emoji(status: DeploymentStatus) -> &'static str {
    match status {
        DeploymentStatus::Pending => "🟡",
        DeploymentStatus::Deploying => "🔄",
        DeploymentStatus::Running => "🟢",
        DeploymentStatus::Failed => "🔴",
        DeploymentStatus::Stopped => "⚫",
    }
}

pub fn welcome(stats: &Stats) -> Reply {
    let text = format!(
        "🤖 Bot Hosting Bot\n\n\
         Deploy your chat bots and keep track of them from here.\n\n\
         🕐 Uptime: {}\n\
         📊 Users: {}\n\
         🤖 Bots: {}\n\n\
         Use /deploy to start, or /help for the full guide.",
        format_uptime(Duration::from_secs(stats.uptime_secs)),
        stats.summary.total_owners,
        stats.summary.total_deployments,
    );
    let reply = button(Reply::text(text), "🚀 Deploy New Bot", Button::DeployNew);
    let reply = button(reply, "📋 My Bots", Button::MyBots);
    let reply = button(reply, "📊 Statistics", Button::Stats);
    button(reply, "❓ Help", Button::Help)
}

pub fn help() -> Reply {
    Reply::text(format!(
        "📚 Help\n\n\
         Deploying:\n\
         1. /deploy and pick a name (lowercase letters, digits, hyphens)\n\
         2. Send the bot token from @BotFather\n\
         3. Upload your files, including one of {}, and optionally requirements.txt\n\
         4. Send /done, review, then reply CONFIRM\n\n\
         Managing:\n\
         • /mybots - list your bots\n\
         • /status <name> - status and recent logs\n\
         • /logs <name> - last {} log lines\n\
         • /stop <name> - stop a bot\n\
         • /restart <name> - start it again\n\
         • /delete <name> - delete permanently\n\
         • /stats - service statistics\n\
         • /cancel - abort a deployment in progress",
        ENTRY_POINTS.join(", "),
        LOGS_LIMIT,
    ))
}

/// Reply for one intake step
pub fn step(step: &Step) -> Reply {
    match step {
        Step::Started { replaced_previous } => {
            let mut text = String::new();
            if *replaced_previous {
                text.push_str("ℹ️ Your previous deployment in progress was discarded.\n\n");
            }
            text.push_str(
                "🚀 New deployment, step 1 of 4\n\n\
                 Enter a name for your bot:\n\
                 • 3-30 characters\n\
                 • lowercase letters, digits and hyphens, starting with a letter\n\
                 • example: my-telegram-bot\n\n\
                 Send /cancel to abort at any time.",
            );
            Reply::text(text)
        }
        Step::NameAccepted { name } => Reply::text(format!(
            "✅ Name `{}` accepted, step 2 of 4\n\nSend your bot token (from @BotFather).",
            name
        )),
        Step::TokenAccepted { bot } => {
            let who = bot
                .username
                .as_ref()
                .map(|u| format!("@{}", u))
                .unwrap_or_else(|| bot.first_name.clone());
            Reply::text(format!(
                "✅ Token verified for {}, step 3 of 4\n\n\
                 Send your files one by one:\n\
                 • required: one of {}\n\
                 • recommended: requirements.txt\n\n\
                 Send /done when finished.",
                who,
                ENTRY_POINTS.join(", ")
            ))
        }
        Step::FileAccepted {
            filename,
            entry_point,
            files,
            deps,
            warnings,
        } => {
            let mut text = format!("✅ `{}` received ({} files", filename, files);
            if *deps > 0 {
                text.push_str(&format!(", {} packages", deps));
            }
            text.push(')');
            if let Some(entry_point) = entry_point {
                text.push_str(&format!("\nEntry point: {}", entry_point));
            }
            for warning in warnings {
                text.push_str("\n⚠️ ");
                text.push_str(match warning {
                    Warning::EntryPointNotABot => {
                        "This file does not look like bot code (no Application or Updater). Saved anyway."
                    }
                    Warning::MissingChatFramework => {
                        "requirements.txt does not list python-telegram-bot. Your bot might not start."
                    }
                });
            }
            Reply::text(text)
        }
        Step::ReadyToConfirm(summary) => confirmation(summary),
        Step::Deployed(deployment) => Reply::text(format!(
            "🚀 Deployment of `{}` started. I'll report progress here.",
            deployment.name
        ))
        .with_action("📊 Status", Button::BotInfo(deployment.name.clone()).data()),
        Step::Cancelled { had_session: true } => Reply::text("❌ Deployment cancelled."),
        Step::Cancelled { had_session: false } => Reply::text("Nothing to cancel."),
        Step::Ignored(Stage::AwaitingFiles) => Reply::text("Send a file, or /done when finished."),
        Step::Ignored(Stage::AwaitingConfirmation) => {
            Reply::text("Reply CONFIRM to deploy, or /cancel to abort.")
        }
        Step::Ignored(_) => Reply::text("Please answer the current step first."),
        Step::NoSession => Reply::text("Use /deploy to start a deployment, or /help for commands."),
    }
}

fn confirmation(summary: &DraftSummary) -> Reply {
    let mut text = format!("📋 Review, step 4 of 4\n\n• Name: {}\n", summary.name);
    if let Some(username) = &summary.bot_username {
        text.push_str(&format!("• Bot: @{}\n", username));
    }
    if let Some(entry_point) = &summary.entry_point {
        text.push_str(&format!("• Entry point: {}\n", entry_point));
    }
    text.push_str(&format!("• Files: {}\n", summary.files.join(", ")));
    text.push_str(&format!("• Packages: {}\n", summary.deps.len()));
    text.push_str("\nReply CONFIRM to deploy, or /cancel to abort.");
    Reply::text(text)
}

/// Reply for a failed operation
pub fn error(err: &BotError) -> Reply {
    let text = match err {
        BotError::Validation(rejection) => format!("❌ {}", rejection),
        BotError::NotFound { name, .. } => format!("❌ Bot `{}` not found. Use /mybots to see your bots.", name),
        BotError::NameConflict(name) => format!(
            "❌ The name `{}` was taken before you confirmed. Start again with /deploy.",
            name
        ),
        BotError::ExternalCall(_) => "❌ An external service failed, please try again.".to_string(),
        _ => "❌ Something went wrong, please try again later.".to_string(),
    };
    Reply::text(text)
}

pub fn usage(command: &str) -> Reply {
    Reply::text(format!("Usage: /{} <bot_name>\nUse /mybots to see your bot names.", command))
}

pub fn deployment_list(deployments: &[Deployment]) -> Reply {
    if deployments.is_empty() {
        return button(
            Reply::text("📭 You haven't deployed any bots yet."),
            "🚀 Deploy New Bot",
            Button::DeployNew,
        );
    }

    let mut text = format!("🤖 Your bots ({})\n\n", deployments.len());
    for (i, deployment) in deployments.iter().enumerate() {
        text.push_str(&format!(
            "{}. {} `{}` - {}\n   Created: {}\n",
            i + 1,
            status_emoji(deployment.status),
            deployment.name,
            deployment.status,
            deployment.created_at.format("%Y-%m-%d"),
        ));
        if let Some(url) = &deployment.url {
            text.push_str(&format!("   URL: {}\n", url));
        }
    }

    let mut reply = Reply::text(text);
    for deployment in deployments.iter().take(LIST_BUTTONS) {
        reply = button(reply, &format!("📊 {}", deployment.name), Button::BotInfo(deployment.name.clone()));
    }
    let reply = button(reply, "🚀 Deploy New", Button::DeployNew);
    button(reply, "🔄 Refresh", Button::RefreshMyBots)
}

pub fn status_card(deployment: &Deployment) -> Reply {
    let age = Utc::now()
        .signed_duration_since(deployment.created_at)
        .to_std()
        .unwrap_or_default();

    let mut text = format!(
        "{} {}\n\n\
         • Status: {}\n\
         • Created: {}\n\
         • Age: {}\n\
         • Files: {}\n\
         • Packages: {}\n",
        status_emoji(deployment.status),
        deployment.name,
        deployment.status.as_str().to_uppercase(),
        deployment.created_at.format("%Y-%m-%d %H:%M:%S"),
        format_uptime(age),
        deployment.files.len(),
        deployment.deps.len(),
    );
    if let Some(url) = &deployment.url {
        text.push_str(&format!("• URL: {}\n", url));
    }

    let recent = deployment.recent_logs(STATUS_LOGS_LIMIT);
    if !recent.is_empty() {
        text.push_str("\n📋 Recent logs:\n");
        for entry in &recent {
            text.push_str(&format!("• {}\n", entry));
        }
    }

    let name = deployment.name.clone();
    let reply = button(Reply::text(text), "📋 View All Logs", Button::ViewLogs(name.clone()));
    let reply = button(reply, "🔄 Restart", Button::RestartBot(name.clone()));
    let reply = button(reply, "🛑 Stop", Button::StopBot(name.clone()));
    button(reply, "🗑️ Delete", Button::DeleteBot(name))
}

pub fn logs(name: &str, entries: &[LogEntry]) -> Reply {
    if entries.is_empty() {
        return Reply::text(format!("📭 No logs available for `{}`.", name));
    }
    let header = format!("📋 Logs for {}\n\n", name);
    let lines: Vec<String> = entries.iter().map(|entry| format!("{}\n", entry)).collect();
    let total = header.chars().count() + lines.iter().map(|line| line.chars().count()).sum::<usize>();
    if total <= MAX_REPLY_CHARS {
        return Reply::text(header + &lines.concat());
    }

    // keep the newest lines that fit
    let mut budget = MAX_REPLY_CHARS.saturating_sub(header.chars().count() + LOGS_TRUNCATED.chars().count());
    let mut kept = lines.len();
    for line in lines.iter().rev() {
        let len = line.chars().count();
        if len > budget {
            break;
        }
        budget -= len;
        kept -= 1;
    }
    Reply::text(header + LOGS_TRUNCATED + &lines[kept..].concat())
}

pub fn stopped(name: &str, outcome: &StopOutcome) -> Reply {
    match outcome {
        StopOutcome::Stopped(_) => Reply::text(format!(
            "✅ Bot `{}` has been stopped.\nUse /restart {} to start it again.",
            name, name
        )),
        StopOutcome::AlreadyStopped => Reply::text(format!("ℹ️ Bot `{}` is already stopped.", name)),
    }
}

pub fn restarted(name: &str, outcome: &RestartOutcome) -> Reply {
    match outcome {
        RestartOutcome::Restarted(_) => Reply::text(format!(
            "✅ Bot `{}` has been restarted.\nIt may take a minute to become active.",
            name
        )),
        RestartOutcome::AlreadyRunning => Reply::text(format!("ℹ️ Bot `{}` is already running.", name)),
    }
}

pub fn confirm_delete(name: &str) -> Reply {
    let reply = Reply::text(format!(
        "⚠️ Delete `{}`?\n\nThis is permanent: files, logs and the hosted service are removed.",
        name
    ));
    let reply = button(reply, "✅ Yes, Delete", Button::ConfirmDelete(name.to_string()));
    button(reply, "❌ Cancel", Button::BotInfo(name.to_string()))
}

pub fn deleted(name: &str) -> Reply {
    Reply::text(format!("🗑️ Bot `{}` has been deleted permanently.", name))
}

pub fn stats(stats: &Stats, process: &ProcessMetrics) -> Reply {
    let mut text = format!(
        "📊 Statistics\n\n\
         • Uptime: {}\n\
         • Memory: {:.1} MB\n\
         • Users: {}\n\
         • Bots: {}\n\
         • Deploying now: {}\n",
        format_uptime(Duration::from_secs(stats.uptime_secs)),
        process.memory_mb,
        stats.summary.total_owners,
        stats.summary.total_deployments,
        stats.active_tasks,
    );
    for status in DeploymentStatus::ALL {
        let count = stats.summary.count(status);
        if count > 0 {
            text.push_str(&format!("  {} {}: {}\n", status_emoji(status), status, count));
        }
    }
    Reply::text(text)
}
