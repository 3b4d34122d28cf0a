// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The agent bridge: one instance per client connection.
//!
//! The bridge is the error firewall of the system.  It parses inbound
//! frames into typed client events, dispatches them, drives `interact`
//! turns through the runtime, and converts every failure — decode errors,
//! handler errors, provider errors, flush errors — into a system message
//! on the event stream.  Nothing escapes `run` while the connection is
//! open.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use parley_config::AgentConfigLoader;
use parley_core::{
    AgentRuntime, CancelFlag, ChatRequest, ChatSession, EventBuilder, EventKind, EventSink,
    PersonaSection, PromptBuilder, PromptSection, RuntimeDefaults, StaticSection,
};
use parley_logger::{logger_with_callback, EventSessionLogger};
use parley_model::{MediaInput, MediaKind};
use parley_session::SessionManager;
use parley_tools::{ToolChest, ToolContext};

use crate::avatar::{AvatarClient, NewAvatarSessionRequest};
use crate::client_events::{parse_client_event, ClientEvent, ControlEvent};
use crate::connection::Connection;
use crate::emitter::BridgeEmitter;
use crate::factory::{runtime_for_agent, ProviderFactory};
use crate::files::FileHandler;

const THINK_TOOLSET: &str = "think";

pub struct AgentBridge {
    chat_session: ChatSession,
    session_manager: Arc<SessionManager>,
    agent_loader: Arc<AgentConfigLoader>,
    tool_chest: Arc<ToolChest>,
    defaults: RuntimeDefaults,
    log_base_dir: PathBuf,
    file_handler: Option<Arc<dyn FileHandler>>,
    avatar_client: Option<Arc<dyn AvatarClient>>,
    provider_factory: Option<ProviderFactory>,
    client_wants_cancel: CancelFlag,
    emitter: Option<Arc<BridgeEmitter>>,
    gateway: Option<Arc<EventSessionLogger>>,
}

impl AgentBridge {
    pub fn new(
        chat_session: ChatSession,
        session_manager: Arc<SessionManager>,
        agent_loader: Arc<AgentConfigLoader>,
        tool_chest: Arc<ToolChest>,
        log_base_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            chat_session,
            session_manager,
            agent_loader,
            tool_chest,
            defaults: RuntimeDefaults::default(),
            log_base_dir: log_base_dir.into(),
            file_handler: None,
            avatar_client: None,
            provider_factory: None,
            client_wants_cancel: CancelFlag::new(),
            emitter: None,
            gateway: None,
        }
    }

    pub fn with_defaults(mut self, defaults: RuntimeDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_file_handler(mut self, handler: Arc<dyn FileHandler>) -> Self {
        self.file_handler = Some(handler);
        self
    }

    pub fn with_avatar_client(mut self, client: Arc<dyn AvatarClient>) -> Self {
        self.avatar_client = Some(client);
        self
    }

    pub fn with_provider_factory(mut self, factory: ProviderFactory) -> Self {
        self.provider_factory = Some(factory);
        self
    }

    pub fn chat_session(&self) -> &ChatSession {
        &self.chat_session
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.client_wants_cancel.clone()
    }

    /// Bind the bridge to a connection: build the emitter and the logging
    /// gateway it sits behind, and activate the agent's toolsets.
    pub fn attach(&mut self, connection: Arc<dyn Connection>) {
        let emitter = Arc::new(BridgeEmitter::new(connection));
        let gateway = Arc::new(logger_with_callback(
            self.log_base_dir.clone(),
            emitter.clone() as Arc<dyn EventSink>,
        ));
        self.emitter = Some(emitter);
        self.gateway = Some(gateway);
        let failures = self
            .tool_chest
            .activate_toolset(&self.chat_session.agent_config.tools);
        if !failures.is_empty() {
            warn!(?failures, "agent declares unknown toolsets");
        }
    }

    fn emitter(&self) -> Arc<BridgeEmitter> {
        self.emitter
            .clone()
            .expect("bridge not attached to a connection")
    }

    fn gateway(&self) -> Arc<EventSessionLogger> {
        self.gateway
            .clone()
            .expect("bridge not attached to a connection")
    }

    fn event_builder(&self) -> EventBuilder {
        EventBuilder::new(self.chat_session.session_id.clone(), "assistant")
    }

    async fn send_error(&self, content: impl Into<String>) {
        let event = self.event_builder().system_error(content, None);
        if let Err(e) = self.gateway().raise(event).await {
            warn!(error = %e, "failed to deliver error event");
        }
    }

    /// Serve this connection until the client disconnects.
    pub async fn run(&mut self, connection: Arc<dyn Connection>) -> anyhow::Result<()> {
        self.attach(connection.clone());
        info!(session_id = %self.chat_session.session_id, "bridge started");

        self.send_capability_snapshot().await;

        loop {
            let frame = match connection.receive().await {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!(session_id = %self.chat_session.session_id, "client disconnected");
                    break;
                }
                Err(e) => {
                    debug!(error = %e, "undecodable client frame");
                    self.send_error("Invalid JSON received").await;
                    continue;
                }
            };
            let event = match parse_client_event(&frame) {
                Ok(event) => event,
                Err(message) => {
                    self.send_error(message).await;
                    continue;
                }
            };
            if let Err(e) = self.dispatch(event).await {
                warn!(session_id = %self.chat_session.session_id, error = %e,
                      "client event handler failed");
                self.send_error(format!("Error processing event: {e}")).await;
            }
        }

        info!(session_id = %self.chat_session.session_id, "bridge stopped");
        Ok(())
    }

    /// Initial capability snapshot: agent catalog, plus the avatar catalog
    /// when an avatar provider is configured.
    async fn send_capability_snapshot(&self) {
        if let Err(e) = self.send_agent_list().await {
            warn!(error = %e, "failed to send agent list");
        }
        if self.avatar_client.is_some() {
            if let Err(e) = self.send_avatar_list().await {
                warn!(error = %e, "failed to send avatar list");
                self.send_error(format!("Failed to list avatars: {e}")).await;
            }
        }
    }

    async fn dispatch(&mut self, event: ClientEvent) -> anyhow::Result<()> {
        match event {
            ClientEvent::TextInput { text, file_ids } => {
                self.interact(&text, &file_ids).await;
                Ok(())
            }
            ClientEvent::GetAgents => self.send_agent_list().await,
            ClientEvent::SetAgent { agent_key } => self.set_agent(&agent_key).await,
            ClientEvent::GetAvatars => self.send_avatar_list().await,
            ClientEvent::SetAvatar { avatar_id, quality, video_encoding } => {
                self.set_avatar(&avatar_id, &quality, &video_encoding).await
            }
            ClientEvent::UpdateTools { tools } => self.update_tools(tools).await,
            ClientEvent::CallTool { name, arguments } => self.call_tool(&name, arguments).await,
            ClientEvent::CancelInteraction => {
                self.client_wants_cancel.set();
                Ok(())
            }
            ClientEvent::Ping => self.emitter().send_control(ControlEvent::Pong).await,
        }
    }

    async fn send_agent_list(&self) -> anyhow::Result<()> {
        self.emitter()
            .send_control(ControlEvent::AgentList {
                agents: self.agent_loader.client_catalog(),
            })
            .await
    }

    async fn send_avatar_list(&self) -> anyhow::Result<()> {
        let avatars = match &self.avatar_client {
            Some(client) => client.list_avatars().await?,
            None => Vec::new(),
        };
        self.emitter()
            .send_control(ControlEvent::AvatarList { avatars })
            .await
    }

    /// Install the catalog agent `agent_key` on the session and reactivate
    /// its toolsets.
    pub async fn set_agent(&mut self, agent_key: &str) -> anyhow::Result<()> {
        if self.chat_session.agent_config.key != agent_key {
            let config = match self.agent_loader.duplicate(agent_key) {
                Ok(config) => config,
                Err(_) => {
                    self.send_error(format!("Agent '{agent_key}' not found")).await;
                    return Ok(());
                }
            };
            let failures = self.tool_chest.activate_toolset(&config.tools);
            if !failures.is_empty() {
                warn!(?failures, agent = %agent_key, "agent declares unknown toolsets");
            }
            self.chat_session.agent_config = config;
            self.chat_session.touch();
            info!(session_id = %self.chat_session.session_id, agent = %agent_key, "agent set");
        }
        self.emitter()
            .send_control(ControlEvent::AgentConfigurationChanged {
                agent_config: self.chat_session.agent_config.clone(),
            })
            .await
    }

    /// Diff the equipped toolset list: activate additions, deactivate
    /// removals, keep only the names that resolved.
    pub async fn update_tools(&mut self, new_tools: Vec<String>) -> anyhow::Result<()> {
        let current: HashSet<String> =
            self.chat_session.agent_config.tools.iter().cloned().collect();
        let wanted: HashSet<String> = new_tools.iter().cloned().collect();

        let additions: Vec<String> = new_tools
            .iter()
            .filter(|t| !current.contains(*t))
            .cloned()
            .collect();
        let removals: Vec<String> = current.difference(&wanted).cloned().collect();

        let failures = self.tool_chest.activate_toolset(&additions);
        self.tool_chest.deactivate_toolset(&removals);
        if !failures.is_empty() {
            self.send_error(format!("Unknown toolsets: {}", failures.join(", "))).await;
        }
        self.chat_session.agent_config.tools = new_tools
            .into_iter()
            .filter(|t| !failures.contains(t))
            .collect();
        self.chat_session.touch();

        self.emitter()
            .send_control(ControlEvent::AgentConfigurationChanged {
                agent_config: self.chat_session.agent_config.clone(),
            })
            .await
    }

    /// End any existing avatar session, open a new one, and announce it.
    pub async fn set_avatar(
        &mut self,
        avatar_id: &str,
        quality: &str,
        video_encoding: &str,
    ) -> anyhow::Result<()> {
        let Some(client) = self.avatar_client.clone() else {
            self.send_error("No avatar provider configured").await;
            return Ok(());
        };
        if let Some(old) = self.emitter().end_avatar_session().await {
            info!(avatar_session = %old, "ended avatar session");
        }
        let session = client
            .create_session(NewAvatarSessionRequest {
                avatar_id: avatar_id.to_string(),
                quality: quality.to_string(),
                video_encoding: video_encoding.to_string(),
            })
            .await?;
        let session_id = session.session_id().to_string();
        self.emitter().set_avatar_session(session).await;
        self.emitter()
            .send_control(ControlEvent::AvatarConnectionChanged {
                avatar_session_id: Some(session_id),
            })
            .await
    }

    /// Direct client-initiated tool call, outside any model turn.
    async fn call_tool(&self, name: &str, arguments: Value) -> anyhow::Result<()> {
        let result = self
            .tool_chest
            .call_tool_or_report(name, arguments, &self.tool_context())
            .await;
        self.gateway()
            .raise(self.event_builder().event(EventKind::Message {
                content: result,
                format: "text".into(),
            }))
            .await
    }

    /// Connect the configured external tool servers and register their
    /// toolsets on this bridge's chest.  Servers that fail to connect are
    /// skipped; the catalog keeps whatever did come up.
    pub async fn register_tool_servers(
        &self,
        config: &parley_toolserver::ToolServersConfig,
    ) -> usize {
        parley_toolserver::register_servers(&self.tool_chest, config)
            .await
            .len()
    }

    fn tool_context(&self) -> ToolContext {
        ToolContext {
            session_id: self.chat_session.session_id.clone(),
            agent_key: self.chat_session.agent_config.key.clone(),
            model_name: self.chat_session.agent_config.model_id.clone(),
            metameta: self.chat_session.metameta(),
        }
    }

    /// One user turn.  Exceptions never escape: each phase reports its own
    /// failure as a system message and ends the turn.
    pub async fn interact(&mut self, user_message: &str, file_ids: &[String]) {
        self.client_wants_cancel.clear();
        self.session_manager.update().await;

        let prepared = match self.prepare_turn(file_ids).await {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(session_id = %self.chat_session.session_id, error = %e,
                      "error preparing chat parameters");
                self.send_error(format!("Error preparing chat parameters: {e}")).await;
                return;
            }
        };

        let gateway = self.gateway();
        let request = ChatRequest {
            chat_session: &mut self.chat_session,
            tool_chest: Arc::clone(&self.tool_chest),
            user_message: user_message.to_string(),
            prompt_metadata: prepared.prompt_metadata,
            client_wants_cancel: self.client_wants_cancel.clone(),
            streaming_callback: gateway as Arc<dyn EventSink>,
            tool_context: prepared.tool_context,
            prompt_builder: Some(prepared.prompt_builder),
            tool_sections: prepared.tool_sections,
            inference: prepared.inference,
            messages: None,
            images: prepared.images,
            audio_clips: prepared.audio_clips,
            files: prepared.files,
            temperature: prepared.temperature,
            reasoning_effort: prepared.reasoning_effort,
            budget_tokens: prepared.budget_tokens,
            max_tokens: prepared.max_tokens,
            emit_history: true,
        };
        if let Err(e) = prepared.runtime.chat(request).await {
            warn!(session_id = %self.chat_session.session_id, error = %e, "error in runtime chat");
            self.send_error(format!("Error in agent runtime chat: {e}")).await;
            return;
        }

        if let Err(e) = self.session_manager.flush_session(&self.chat_session).await {
            warn!(session_id = %self.chat_session.session_id, error = %e,
                  "error flushing session manager");
            self.send_error(format!("Error flushing session manager: {e}")).await;
        }
    }

    /// Resolve the runtime, fetch and partition file inputs, build prompt
    /// sections, and warm up the toolsets.
    async fn prepare_turn(&self, file_ids: &[String]) -> anyhow::Result<PreparedTurn> {
        let agent = self.chat_session.agent_config.clone();
        let runtime = runtime_for_agent(&agent, &self.defaults, self.provider_factory.as_ref())?;

        let mut images = Vec::new();
        let mut audio_clips = Vec::new();
        let mut files = Vec::new();
        if !file_ids.is_empty() {
            let handler = self
                .file_handler
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("no file handler configured"))?;
            for id in file_ids {
                let input = handler.fetch(id, &self.chat_session.session_id).await?;
                match input.kind() {
                    MediaKind::Image => images.push(input),
                    MediaKind::Audio => audio_clips.push(input),
                    MediaKind::Other => files.push(input),
                }
            }
            debug!(
                images = images.len(),
                audio = audio_clips.len(),
                files = files.len(),
                "processed file inputs"
            );
        }

        let tool_context = self.tool_context();
        let failures = self.tool_chest.activate_toolset(&agent.tools);
        if !failures.is_empty() {
            warn!(?failures, "agent declares unknown toolsets");
        }
        self.tool_chest
            .initialize_toolsets(&agent.tools, &tool_context)
            .await?;
        let inference = if agent.tools.is_empty() {
            None
        } else {
            Some(
                self.tool_chest
                    .get_inference_data(&agent.tools, runtime.tool_format()),
            )
        };

        // Default sections: the persona, with the think protocol prepended
        // when the think toolset is equipped.  Sections from every other
        // equipped toolset render after the configured ones.
        let mut sections: Vec<Arc<dyn PromptSection>> = Vec::new();
        let mut tool_sections = Vec::new();
        for toolset in &agent.tools {
            for text in self.tool_chest.prompt_sections(std::slice::from_ref(toolset)) {
                if toolset == THINK_TOOLSET {
                    sections.push(Arc::new(StaticSection(text)));
                } else {
                    tool_sections.push(text);
                }
            }
        }
        sections.push(Arc::new(PersonaSection));

        let prompt_metadata: HashMap<String, serde_json::Value> =
            agent.prompt_metadata.clone().unwrap_or_default();
        let params = agent.agent_params.as_ref();

        Ok(PreparedTurn {
            runtime,
            images,
            audio_clips,
            files,
            prompt_metadata,
            prompt_builder: PromptBuilder::new(sections),
            tool_sections,
            inference,
            tool_context,
            temperature: params.and_then(|p| p.temperature()),
            reasoning_effort: params.and_then(|p| p.reasoning_effort()),
            budget_tokens: params.and_then(|p| p.budget_tokens()),
            max_tokens: params.and_then(|p| p.max_tokens()),
        })
    }
}

struct PreparedTurn {
    runtime: AgentRuntime,
    images: Vec<MediaInput>,
    audio_clips: Vec<MediaInput>,
    files: Vec<MediaInput>,
    prompt_metadata: HashMap<String, serde_json::Value>,
    prompt_builder: PromptBuilder,
    tool_sections: Vec<String>,
    inference: Option<parley_tools::InferenceData>,
    tool_context: ToolContext,
    temperature: Option<f32>,
    reasoning_effort: Option<parley_config::ReasoningEffort>,
    budget_tokens: Option<u32>,
    max_tokens: Option<u32>,
}
