//! The conversational booking agent.
//!
//! Each customer message runs one turn: the transcript goes to the model
//! with the tool schemas, any requested tools run against pricing,
//! availability and bookings, and a second call phrases the results. The
//! chat summary is refreshed after every reply so a later booking starts
//! from everything the customer has said.

pub mod prompt;
pub mod summary;
pub mod tools;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use cb_api::{ChatCompletionRequest, WireMessage};
use cb_core::constants::{role, AGENT_FALLBACK_REPLY};
use cb_core::error::{CbError, CbResult};
use cb_models::queries::{self, ChatWithDetails};
use cb_models::{Business, Chat, ChatMessage};

use crate::booking::BookingService;
use crate::context::ServiceContext;
use crate::event_bus::AppEvent;
use crate::service::{Service, ServiceState};

/// What one turn produced.
#[derive(Debug, Clone, Serialize)]
pub struct AgentReply {
    pub chat_id: String,
    pub reply: String,
    /// Names of the tools the model called, in order.
    pub tools_used: Vec<String>,
    /// Set once the chat has produced a booking.
    pub booking_id: Option<String>,
}

/// Runs agent turns and manages stored chats.
pub struct AgentService {
    state: ServiceState,
    ctx: ServiceContext,
    bookings: BookingService,
}

impl AgentService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self {
            state: ServiceState::Created,
            bookings: BookingService::new(ctx.clone()),
            ctx,
        }
    }

    // ─── Chats ───────────────────────────────────────────────────────────

    /// The chat for a client, created on first contact.
    pub fn get_or_create_chat(&self, business: &Business, client_key: &str) -> CbResult<Chat> {
        let business_id = business
            .id
            .ok_or_else(|| CbError::Database("business has no id".into()))?;
        let key = client_key.trim();
        if key.is_empty() {
            return Err(CbError::Validation("Client key is required".into()));
        }
        let conn = self.ctx.database.conn()?;
        if let Some(chat) = Chat::find_by_client(&conn, business_id, key)? {
            return Ok(chat);
        }
        let mut chat = Chat::new(business_id, key);
        chat.save(&conn)?;
        info!("new chat {} for {} ({})", chat.chat_id, business.business_id, key);
        Ok(chat)
    }

    /// Find a chat by its `CH…` id or by client key.
    pub fn find_chat(&self, business: &Business, key: &str) -> CbResult<Chat> {
        let business_id = business
            .id
            .ok_or_else(|| CbError::Database("business has no id".into()))?;
        let conn = self.ctx.database.conn()?;
        if let Some(chat) = Chat::find_by_chat_id(&conn, key)?.filter(|c| c.business_id == business_id) {
            return Ok(chat);
        }
        Chat::find_by_client(&conn, business_id, key)?.ok_or_else(|| CbError::not_found("chat", key))
    }

    pub fn list_chats(&self, business: &Business, limit: i64) -> CbResult<Vec<ChatWithDetails>> {
        let business_id = business
            .id
            .ok_or_else(|| CbError::Database("business has no id".into()))?;
        let conn = self.ctx.database.conn()?;
        queries::list_chats_with_details(&conn, business_id, limit)
    }

    /// A chat with its full transcript.
    pub fn transcript(&self, business: &Business, key: &str) -> CbResult<(Chat, Vec<ChatMessage>)> {
        let chat = self.find_chat(business, key)?;
        let conn = self.ctx.database.conn()?;
        let messages = chat.messages(&conn)?;
        Ok((chat, messages))
    }

    /// Delete a chat and its messages.
    pub fn delete_chat(&self, business: &Business, key: &str) -> CbResult<()> {
        let chat = self.find_chat(business, key)?;
        let conn = self.ctx.database.conn()?;
        if let Some(id) = chat.id {
            Chat::delete(&conn, id)?;
        }
        info!("deleted chat {}", chat.chat_id);
        Ok(())
    }

    /// Re-extract and store the summary of a chat.
    pub async fn summarize(&self, business: &Business, key: &str) -> CbResult<Chat> {
        let mut chat = self.find_chat(business, key)?;
        self.refresh_summary(&mut chat).await?;
        Ok(chat)
    }

    fn save_message(&self, chat: &Chat, role_name: &str, text: &str, first: bool) -> CbResult<()> {
        let chat_row = chat
            .id
            .ok_or_else(|| CbError::Database("chat has no id".into()))?;
        let mut message = ChatMessage::new(chat_row, role_name, text);
        message.is_first_message = first;
        let conn = self.ctx.database.conn()?;
        message.save(&conn)?;
        self.ctx.event_bus.emit(AppEvent::ChatMessageSaved {
            business_id: chat.business_id,
            chat_id: chat.chat_id.clone(),
            role: role_name.to_string(),
        });
        Ok(())
    }

    /// User and assistant turns as wire messages. Stored tool results are
    /// left out: they are only valid next to the call that produced them.
    fn history(&self, chat: &Chat) -> CbResult<Vec<WireMessage>> {
        let conn = self.ctx.database.conn()?;
        let messages = chat.messages(&conn)?;
        Ok(summary::conversation_turns(&messages)
            .into_iter()
            .map(|m| {
                if m.role == role::USER {
                    WireMessage::user(m.message.clone())
                } else {
                    WireMessage::assistant(m.message.clone())
                }
            })
            .collect())
    }

    fn conversation_prompt(&self, business: &Business) -> CbResult<String> {
        let conn = self.ctx.database.conn()?;
        let agent_prompt = business.agent_prompt(&conn)?;
        let settings = business.settings(&conn)?;
        let custom_addons = business.custom_addons(&conn)?;
        let context = prompt::business_context(&settings.prices, &custom_addons);
        Ok(prompt::system_prompt(
            &self.ctx.config.llm.agent_name,
            &business.name,
            &agent_prompt,
            &context,
        ))
    }

    // ─── Turns ───────────────────────────────────────────────────────────

    pub async fn handle_message(&self, business_id: &str, client_key: &str, text: &str) -> CbResult<AgentReply> {
        self.handle_message_at(business_id, client_key, text, Utc::now()).await
    }

    /// Run one conversation turn for a customer message.
    pub async fn handle_message_at(
        &self,
        business_id: &str,
        client_key: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> CbResult<AgentReply> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CbError::Validation("Message is required".into()));
        }
        let llm = self.ctx.require_llm()?;
        let business = self.ctx.business(business_id)?;
        let mut chat = self.get_or_create_chat(&business, client_key)?;

        let first = {
            let conn = self.ctx.database.conn()?;
            match chat.id {
                Some(id) => ChatMessage::count_for_chat(&conn, id)? == 0,
                None => true,
            }
        };
        self.save_message(&chat, role::USER, text, first)?;

        let system = self.conversation_prompt(&business)?;
        let history = self.history(&chat)?;
        let llm_config = &self.ctx.config.llm;

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(WireMessage::system(system));
        messages.extend(history.iter().cloned());

        let request = ChatCompletionRequest::new(&llm_config.model, messages)
            .with_tools(tools::tool_specs())
            .with_temperature(llm_config.temperature)
            .with_max_tokens(llm_config.max_tokens);
        let response = llm.complete(&request).await?;
        let first_message = response
            .first_message()
            .cloned()
            .ok_or_else(|| CbError::Llm("completion returned no choices".into()))?;

        let mut tools_used = Vec::new();
        let reply = if !first_message.has_tool_calls() {
            first_message.content.clone().unwrap_or_default()
        } else {
            let calls = first_message.tool_calls.clone().unwrap_or_default();
            let mut results = Vec::with_capacity(calls.len());
            for call in &calls {
                let result = self.execute_tool(&business, &mut chat, &call.function, now).await;
                self.save_message(&chat, role::TOOL, &result, false)?;
                tools_used.push(call.function.name.clone());
                results.push(WireMessage::tool(call.id.clone(), result));
            }

            let mut followup = Vec::with_capacity(history.len() + results.len() + 2);
            followup.push(WireMessage::system(prompt::response_prompt(&llm_config.agent_name)));
            followup.extend(history);
            followup.push(first_message.clone());
            followup.extend(results);

            let request = ChatCompletionRequest::new(&llm_config.model, followup)
                .with_temperature(llm_config.temperature)
                .with_max_tokens(llm_config.max_tokens);
            match llm.complete(&request).await {
                Ok(resp) => resp
                    .first_message()
                    .and_then(|m| m.content.clone())
                    .filter(|c| !c.trim().is_empty())
                    .unwrap_or_else(|| fallback_reply(&first_message)),
                Err(e) => {
                    warn!("follow-up completion failed: {e}");
                    fallback_reply(&first_message)
                }
            }
        };

        self.save_message(&chat, role::ASSISTANT, &reply, false)?;
        debug!("chat {} replied with {} tool(s)", chat.chat_id, tools_used.len());

        if let Err(e) = self.refresh_summary(&mut chat).await {
            warn!("could not refresh summary of chat {}: {e}", chat.chat_id);
        }

        Ok(AgentReply {
            chat_id: chat.chat_id.clone(),
            reply,
            tools_used,
            booking_id: chat.summary_str("bookingId").map(str::to_string),
        })
    }
}

/// The model's own text from the tool-calling turn, if it wrote any.
fn fallback_reply(first: &WireMessage) -> String {
    first
        .content
        .clone()
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| AGENT_FALLBACK_REPLY.to_string())
}

impl Service for AgentService {
    fn name(&self) -> &str {
        "agent"
    }

    fn state(&self) -> ServiceState {
        self.state
    }

    fn init(&mut self) -> CbResult<()> {
        self.state = if self.ctx.llm.is_some() {
            ServiceState::Running
        } else {
            warn!("agent: no LLM configured");
            ServiceState::Degraded
        };
        Ok(())
    }

    fn detail(&self) -> Option<String> {
        (self.state == ServiceState::Degraded).then(|| "no LLM configured".to_string())
    }

    fn shutdown(&mut self) -> CbResult<()> {
        self.state = ServiceState::Stopped;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_prefers_model_text() {
        let mut m = WireMessage::assistant("Let me check that for you.");
        assert_eq!(fallback_reply(&m), "Let me check that for you.");
        m.content = None;
        assert_eq!(fallback_reply(&m), AGENT_FALLBACK_REPLY);
    }
}
