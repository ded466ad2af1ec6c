use crate::command::{CommandRegistry, CommandResult};
use crate::component::ActivityTracker;
use crate::core::packet::{Packet, PacketType, HEARTBEAT_HEADER};
use crate::error::{FrameworkError, Result};
use crate::protocol::event_bus::{events, EventArgs, EventBus};
use crate::session::Session;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument, trace};

/// Routes decoded packets from one session.
///
/// - heartbeat: refresh liveness, answer with a heartbeat
/// - command: run through the registry, answer with a response or error
/// - anything else: publish under its header and under `OnDataReceived`
#[derive(Debug, Clone)]
pub struct PacketRouter {
    commands: Arc<CommandRegistry>,
    bus: EventBus,
}

impl PacketRouter {
    pub fn new(commands: Arc<CommandRegistry>, bus: EventBus) -> Self {
        Self { commands, bus }
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    /// Handle one packet; the returned packet, if any, goes back to the sender
    #[instrument(level = "debug", skip(self, session, packet), fields(session = %session.id(), header = %packet.header))]
    pub async fn route(&self, session: &Arc<Session>, packet: Packet) -> Result<Option<Packet>> {
        session
            .components()
            .with_mut::<ActivityTracker, _>(ActivityTracker::record_inbound);

        if is_heartbeat(&packet) {
            if !session.update_heartbeat() {
                trace!("Heartbeat from session without liveness tracking");
            }
            let mut reply = Packet::heartbeat();
            reply.key = packet.key;
            return Ok(Some(reply));
        }

        if packet.packet_type == PacketType::Command {
            return Ok(Some(self.run_command(session, &packet)));
        }

        let header = packet.header.clone();
        let base = EventArgs::new(events::ON_DATA_RECEIVED)
            .with_session(session.id())
            .with_packet(packet);
        let named = EventArgs {
            name: header,
            ..base.clone()
        };
        self.bus.publish_event(named).await?;
        self.bus.publish_event(base).await?;
        Ok(None)
    }

    fn run_command(&self, session: &Arc<Session>, packet: &Packet) -> Packet {
        let args = match &packet.body {
            Value::Null => Vec::new(),
            Value::Array(items) => items.clone(),
            other => {
                debug!(kind = %crate::command::schema::value_kind(other), "Command body is not an argument list");
                let err = FrameworkError::ProtocolFormat("Command body must be an array".into());
                return Packet::error_to(packet, err.to_string());
            }
        };

        let result = self
            .commands
            .execute(&packet.header, &args, session.as_ref());
        reply_for(packet, &result)
    }
}

fn is_heartbeat(packet: &Packet) -> bool {
    packet.packet_type == PacketType::Heartbeat || packet.header == HEARTBEAT_HEADER
}

/// Response on success, Error on failure; both carry the full result
fn reply_for(request: &Packet, result: &CommandResult) -> Packet {
    let body = serde_json::to_value(result).unwrap_or(Value::Null);
    let mut reply = Packet::response_to(request, body);
    if !result.success {
        reply.packet_type = PacketType::Error;
    }
    reply
}
