//! Unsolicited server-to-client messages

use crate::error::ProtocolError;
use crate::geometry::Point;
use crate::ipc::{AttachmentWriter, Message};
use crate::region::Region;

use super::Opcode;

/// Notifications the server posts to a window's client port.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Content that must be redrawn, in window coordinates.
    Update { region: Region },
    WindowActivated { active: bool },
    WindowMoved { to: Point },
    WindowResized { width: i32, height: i32 },
    WorkspacesChanged { old: u32, new: u32 },
    QuitRequested,
}

impl ServerEvent {
    pub fn opcode(&self) -> Opcode {
        match self {
            ServerEvent::Update { .. } => Opcode::Update,
            ServerEvent::WindowActivated { .. } => Opcode::WindowActivated,
            ServerEvent::WindowMoved { .. } => Opcode::WindowMoved,
            ServerEvent::WindowResized { .. } => Opcode::WindowResized,
            ServerEvent::WorkspacesChanged { .. } => Opcode::WorkspacesChanged,
            ServerEvent::QuitRequested => Opcode::QuitRequested,
        }
    }

    pub fn to_message(&self) -> Message {
        let mut w = AttachmentWriter::new();
        match self {
            ServerEvent::Update { region } => {
                w.region(region);
            }
            ServerEvent::WindowActivated { active } => {
                w.bool(*active);
            }
            ServerEvent::WindowMoved { to } => {
                w.point(*to);
            }
            ServerEvent::WindowResized { width, height } => {
                w.i32(*width).i32(*height);
            }
            ServerEvent::WorkspacesChanged { old, new } => {
                w.u32(*old).u32(*new);
            }
            ServerEvent::QuitRequested => {}
        }
        Message::new(self.opcode() as u32, w.finish())
    }

    /// Decodes an event; `Ok(None)` for replies and client requests.
    pub fn from_message(message: &Message) -> Result<Option<ServerEvent>, ProtocolError> {
        let Some(op) = Opcode::from_u32(message.code) else {
            return Err(ProtocolError::UnknownOpcode(message.code));
        };
        let mut r = message.reader();
        let event = match op {
            Opcode::Update => ServerEvent::Update { region: r.region()? },
            Opcode::WindowActivated => ServerEvent::WindowActivated { active: r.bool()? },
            Opcode::WindowMoved => ServerEvent::WindowMoved { to: r.point()? },
            Opcode::WindowResized => ServerEvent::WindowResized {
                width: r.i32()?,
                height: r.i32()?,
            },
            Opcode::WorkspacesChanged => ServerEvent::WorkspacesChanged {
                old: r.u32()?,
                new: r.u32()?,
            },
            Opcode::QuitRequested => ServerEvent::QuitRequested,
            _ => return Ok(None),
        };
        r.finish()?;
        Ok(Some(event))
    }
}
