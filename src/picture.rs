//! Recorded pictures
//!
//! A [`ServerPicture`] is a replayable list of drawing and drawing-state
//! operations. Each entry is a `u16` opcode, a `u32` payload length, and the
//! operation's attachment stream, so the stored form is exactly what the
//! dispatcher decodes from the wire.
//!
//! Recording targets attach to a view. While the current view has one, the
//! dispatcher appends operations here instead of rasterizing them.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::ProtocolError;
use crate::ipc::{AttachmentReader, AttachmentWriter};
use crate::protocol::{DrawOp, Opcode, StateOp};
use crate::view::ViewToken;

const ENTRY_HEADER: usize = 2 + 4;

/// One recorded operation.
#[derive(Debug, Clone, PartialEq)]
pub enum PictureOp {
    State(StateOp),
    Draw(DrawOp),
}

impl PictureOp {
    pub fn opcode(&self) -> Opcode {
        match self {
            PictureOp::State(op) => op.opcode(),
            PictureOp::Draw(op) => op.opcode(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerPicture {
    data: Vec<u8>,
    count: usize,
}

impl ServerPicture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and adopts a serialized op stream.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, ProtocolError> {
        let count = Entries::new(&data).try_fold(0usize, |n, entry| entry.map(|_| n + 1))?;
        Ok(Self { data, count })
    }

    pub fn record(&mut self, op: &PictureOp) {
        let mut payload = AttachmentWriter::new();
        match op {
            PictureOp::State(state) => state.encode(&mut payload),
            PictureOp::Draw(draw) => draw.encode(&mut payload),
        }
        let mut header = [0u8; ENTRY_HEADER];
        LittleEndian::write_u16(&mut header[..2], op.opcode() as u32 as u16);
        LittleEndian::write_u32(&mut header[2..], payload.len() as u32);
        self.data.extend_from_slice(&header);
        self.data.extend_from_slice(payload.as_bytes());
        self.count += 1;
    }

    pub fn append(&mut self, other: &ServerPicture) {
        self.data.extend_from_slice(&other.data);
        self.count += other.count;
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Decodes every recorded operation in order.
    pub fn ops(&self) -> Result<Vec<PictureOp>, ProtocolError> {
        Entries::new(&self.data).collect()
    }
}

struct Entries<'a> {
    rest: &'a [u8],
}

impl<'a> Entries<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { rest: data }
    }

    fn decode(&mut self) -> Result<PictureOp, ProtocolError> {
        if self.rest.len() < ENTRY_HEADER {
            return Err(ProtocolError::Truncated {
                needed: ENTRY_HEADER - self.rest.len(),
            });
        }
        let code = LittleEndian::read_u16(&self.rest[..2]) as u32;
        let len = LittleEndian::read_u32(&self.rest[2..ENTRY_HEADER]) as usize;
        let body = &self.rest[ENTRY_HEADER..];
        if body.len() < len {
            return Err(ProtocolError::Truncated {
                needed: len - body.len(),
            });
        }
        let (payload, rest) = body.split_at(len);
        self.rest = rest;

        let op = Opcode::from_u32(code).ok_or(ProtocolError::UnknownOpcode(code))?;
        let mut reader = AttachmentReader::new(payload);
        let decoded = if let Some(state) = StateOp::decode(op, &mut reader)? {
            PictureOp::State(state)
        } else if let Some(draw) = DrawOp::decode(op, &mut reader)? {
            PictureOp::Draw(draw)
        } else {
            return Err(ProtocolError::NotARequest(op));
        };
        reader.finish()?;
        Ok(decoded)
    }
}

impl Iterator for Entries<'_> {
    type Item = Result<PictureOp, ProtocolError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        let item = self.decode();
        if item.is_err() {
            self.rest = &[];
        }
        Some(item)
    }
}

/// A picture being recorded against one view.
#[derive(Debug, Clone)]
pub struct Recording {
    pub view: ViewToken,
    /// Existing picture being extended, if this recording appends.
    pub append_to: Option<u32>,
    pub picture: ServerPicture,
}

/// Stack of open recordings; pictures may be begun while another records.
#[derive(Debug, Default)]
pub struct PictureRecorder {
    stack: Vec<Recording>,
}

impl PictureRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, view: ViewToken, append_to: Option<(u32, ServerPicture)>) {
        let (append_to, picture) = match append_to {
            Some((token, base)) => (Some(token), base),
            None => (None, ServerPicture::new()),
        };
        self.stack.push(Recording {
            view,
            append_to,
            picture,
        });
    }

    pub fn end(&mut self) -> Option<Recording> {
        self.stack.pop()
    }

    /// The innermost recording, if it is attached to `view`.
    pub fn target_for(&mut self, view: ViewToken) -> Option<&mut ServerPicture> {
        self.stack
            .last_mut()
            .filter(|recording| recording.view == view)
            .map(|recording| &mut recording.picture)
    }

    /// Drops recordings attached to a deleted view.
    pub fn detach_view(&mut self, view: ViewToken) {
        self.stack.retain(|recording| recording.view != view);
    }

    pub fn is_recording(&self) -> bool {
        !self.stack.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{PointF, RectF, Rgba};

    fn sample_ops() -> Vec<PictureOp> {
        vec![
            PictureOp::State(StateOp::PushState),
            PictureOp::State(StateOp::SetHighColor(Rgba::new(10, 20, 30, 255))),
            PictureOp::Draw(DrawOp::FillRect(RectF::new(0.0, 0.0, 10.0, 10.0))),
            PictureOp::Draw(DrawOp::DrawString {
                text: "label".to_string(),
                at: PointF::new(2.0, 8.0),
            }),
            PictureOp::State(StateOp::PopState),
        ]
    }

    #[test]
    fn test_recorded_ops_replay_in_order() {
        let mut picture = ServerPicture::new();
        for op in sample_ops() {
            picture.record(&op);
        }
        assert_eq!(picture.len(), 5);
        assert_eq!(picture.ops().unwrap(), sample_ops());
    }

    #[test]
    fn test_entry_layout_is_length_prefixed() {
        let mut picture = ServerPicture::new();
        picture.record(&PictureOp::State(StateOp::SetPenSize(2.0)));
        let bytes = picture.as_bytes();
        assert_eq!(
            LittleEndian::read_u16(&bytes[..2]),
            Opcode::SetPenSize as u32 as u16
        );
        assert_eq!(LittleEndian::read_u32(&bytes[2..6]), 5);
        assert_eq!(bytes.len(), 6 + 5);
    }

    #[test]
    fn test_from_bytes_rejects_truncated_stream() {
        let mut picture = ServerPicture::new();
        picture.record(&PictureOp::Draw(DrawOp::FillRect(RectF::new(0.0, 0.0, 1.0, 1.0))));
        let bytes = picture.as_bytes().to_vec();

        let copy = ServerPicture::from_bytes(bytes.clone()).unwrap();
        assert_eq!(copy, picture);
        assert!(ServerPicture::from_bytes(bytes[..bytes.len() - 1].to_vec()).is_err());
    }

    #[test]
    fn test_append_concatenates() {
        let mut a = ServerPicture::new();
        a.record(&PictureOp::State(StateOp::PushState));
        let mut b = ServerPicture::new();
        b.record(&PictureOp::State(StateOp::PopState));
        a.append(&b);
        assert_eq!(
            a.ops().unwrap(),
            vec![
                PictureOp::State(StateOp::PushState),
                PictureOp::State(StateOp::PopState)
            ]
        );
    }

    #[test]
    fn test_recorder_targets_only_its_view() {
        let mut recorder = PictureRecorder::new();
        let view = ViewToken(1);
        recorder.begin(view, None);
        assert!(recorder.target_for(view).is_some());
        assert!(recorder.target_for(ViewToken(2)).is_none());

        recorder.begin(ViewToken(2), None);
        assert!(recorder.target_for(view).is_none());
        let inner = recorder.end().unwrap();
        assert_eq!(inner.view, ViewToken(2));

        recorder.detach_view(view);
        assert!(!recorder.is_recording());
    }
}
