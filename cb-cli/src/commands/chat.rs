//! Agent chat commands.

use clap::Subcommand;
use console::style;
use dialoguer::{Confirm, Input};
use serde_json::json;

use cb_core::config::ConfigHandle;
use cb_core::constants::role;
use cb_core::error::{CbError, CbResult};
use cb_services::{AgentReply, AgentService};
use crate::OutputFormat;

#[derive(Subcommand)]
pub enum ChatAction {
    /// Send one customer message to the booking agent.
    Send {
        /// Business id (BUS-nnnn).
        business: String,
        /// Customer key: a phone number, session id or similar.
        client: String,
        text: String,
    },
    /// Talk to the agent as a customer until "quit".
    Interactive {
        business: String,
        client: String,
    },
    /// Print a conversation.
    Transcript {
        business: String,
        /// Chat id (CH...) or customer key.
        chat: String,
    },
    /// List conversations, most recent first.
    List {
        business: String,
        #[arg(short = 'n', long, default_value = "25")]
        limit: i64,
    },
    /// Re-extract the booking details from a conversation.
    Summary {
        business: String,
        chat: String,
    },
    Delete {
        business: String,
        chat: String,
        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },
}

fn print_reply(reply: &AgentReply) {
    println!("{} {}", style("agent>").green().bold(), reply.reply);
    if !reply.tools_used.is_empty() {
        println!("{}", style(format!("        (used {})", reply.tools_used.join(", "))).dim());
    }
    if let Some(id) = &reply.booking_id {
        println!("        {} booking {}", style("BOOKED").green().bold(), style(id).cyan());
    }
}

fn is_exit(line: &str) -> bool {
    matches!(line.trim().to_lowercase().as_str(), "" | "quit" | "exit")
}

pub async fn run(config: ConfigHandle, action: ChatAction, format: OutputFormat) -> CbResult<()> {
    let registry = super::open_services(&config).await?;
    let agent = AgentService::new(registry.ctx.clone());

    match action {
        ChatAction::Send { business, client, text } => {
            let mut rx = registry.event_bus().subscribe();
            let pb = super::spinner("Waiting for the agent...");
            let result = agent.handle_message(&business, &client, &text).await;
            pb.finish_and_clear();
            let reply = result?;
            super::settle(&registry, &mut rx).await;
            match format {
                OutputFormat::Json => super::print_json(&reply),
                OutputFormat::Text => print_reply(&reply),
            }
        }
        ChatAction::Interactive { business, client } => {
            // Fail early on an unknown business.
            registry.ctx.business(&business)?;
            println!("Chatting as {}. Type quit to leave.", style(&client).cyan());
            let mut rx = registry.event_bus().subscribe();
            loop {
                let line: String = Input::new()
                    .with_prompt("you")
                    .allow_empty(true)
                    .interact_text()
                    .map_err(|e| CbError::Internal(e.to_string()))?;
                if is_exit(&line) {
                    break;
                }
                let pb = super::spinner("...");
                let result = agent.handle_message(&business, &client, &line).await;
                pb.finish_and_clear();
                match result {
                    Ok(reply) => print_reply(&reply),
                    Err(e) => println!("  {} {}", style("ERROR").red().bold(), e),
                }
                super::settle(&registry, &mut rx).await;
            }
        }
        ChatAction::Transcript { business, chat } => {
            let business = registry.ctx.business(&business)?;
            let (chat, messages) = agent.transcript(&business, &chat)?;
            match format {
                OutputFormat::Json => super::print_json(&json!({"chat": chat, "messages": messages})),
                OutputFormat::Text => {
                    println!(
                        "{} ({})",
                        style(format!("Chat {}", chat.chat_id)).bold().underlined(),
                        chat.client_key
                    );
                    for m in &messages {
                        let who = match m.role.as_str() {
                            role::USER => style("customer").cyan().bold(),
                            role::ASSISTANT => style("agent").green().bold(),
                            _ => style(m.role.as_str()).dim(),
                        };
                        println!("[{}] {}: {}", m.created_at.format("%m-%d %H:%M"), who, m.message);
                    }
                }
            }
        }
        ChatAction::List { business, limit } => {
            let business = registry.ctx.business(&business)?;
            let chats = agent.list_chats(&business, limit)?;
            match format {
                OutputFormat::Json => {
                    let out: Vec<_> = chats
                        .iter()
                        .map(|c| {
                            json!({
                                "chat": c.chat,
                                "message_count": c.message_count,
                                "last_message": c.last_message,
                                "last_role": c.last_role,
                            })
                        })
                        .collect();
                    super::print_json(&out);
                }
                OutputFormat::Text => {
                    if chats.is_empty() {
                        println!("No chats found.");
                    } else {
                        let mut table = super::new_table(vec!["ID", "Client", "Messages", "Booking", "Last message"]);
                        for c in &chats {
                            table.add_row(vec![
                                c.chat.chat_id.clone(),
                                c.chat.client_key.clone(),
                                c.message_count.to_string(),
                                c.chat.summary_str("bookingId").unwrap_or("-").to_string(),
                                super::truncate(c.last_message.as_deref().unwrap_or(""), 50),
                            ]);
                        }
                        println!("{table}");
                    }
                }
            }
        }
        ChatAction::Summary { business, chat } => {
            let business = registry.ctx.business(&business)?;
            let pb = super::spinner("Summarizing...");
            let result = agent.summarize(&business, &chat).await;
            pb.finish_and_clear();
            let chat = result?;
            super::print_json(&chat.summary);
        }
        ChatAction::Delete { business, chat, yes } => {
            let business = registry.ctx.business(&business)?;
            let confirmed = yes
                || Confirm::new()
                    .with_prompt(format!("  Delete chat {chat} and its messages?"))
                    .default(false)
                    .interact()
                    .unwrap_or(false);
            if !confirmed {
                println!("  Delete cancelled.");
            } else {
                agent.delete_chat(&business, &chat)?;
                println!("  {} Chat deleted.", style("OK").green().bold());
            }
        }
    }

    registry.shutdown_all().await
}
