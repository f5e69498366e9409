//! Client/server wire protocol
//!
//! Every message starts with a 4-byte code from the flat [`Opcode`]
//! enumeration, followed by a type-tagged attachment stream (see
//! [`crate::ipc::link`]). Client requests decode into the [`Request`]
//! tagged union; drawing primitives and drawing-state changes form their
//! own [`DrawOp`] and [`StateOp`] types so the picture recorder can store
//! exactly what the dispatcher would otherwise execute.
//!
//! Replies always start with an `I32` status attachment.

pub mod events;

use serde::Serialize;

use crate::error::{ProtocolError, Status};
use crate::geometry::{Point, PointF, Rect, RectF, Rgba};
use crate::ipc::{AttachmentReader, AttachmentWriter, Message};
use crate::region::Region;
use crate::window::{WindowFeel, WindowFlags, WindowLook};

pub use events::ServerEvent;

macro_rules! opcodes {
    ($($name:ident = $value:literal,)*) => {
        /// Every message code, client requests and server messages alike.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u32)]
        pub enum Opcode {
            $($name = $value,)*
        }

        impl Opcode {
            pub fn from_u32(code: u32) -> Option<Opcode> {
                match code {
                    $($value => Some(Opcode::$name),)*
                    _ => None,
                }
            }
        }
    };
}

opcodes! {
    // bootstrap and session ports
    GetDesktop = 0x0001,
    CreateWindow = 0x0010,
    SetWorkspace = 0x0011,
    GetWorkspace = 0x0012,
    CountWorkspaces = 0x0013,

    // window level
    CreateRootView = 0x0100,
    CreateView = 0x0101,
    CreateWorkspacesView = 0x0102,
    DeleteView = 0x0103,
    SetCurrentView = 0x0104,
    ShowWindow = 0x0110,
    HideWindow = 0x0111,
    ActivateWindow = 0x0112,
    QuitWindow = 0x0113,
    MoveWindowBy = 0x0120,
    MoveWindowTo = 0x0121,
    ResizeWindowBy = 0x0122,
    ResizeWindowTo = 0x0123,
    SetSizeLimits = 0x0124,
    GetSizeLimits = 0x0125,
    GetWindowFrame = 0x0126,
    SetWorkspaces = 0x0130,
    GetWorkspaces = 0x0131,
    SetTitle = 0x0132,
    SetLook = 0x0133,
    SetFeel = 0x0134,
    SetFlags = 0x0135,
    AddToSubset = 0x0136,
    RemoveFromSubset = 0x0137,
    Sync = 0x0140,

    // current view
    MoveViewTo = 0x0200,
    ResizeViewTo = 0x0201,
    ScrollViewTo = 0x0202,
    HideView = 0x0203,
    ShowView = 0x0204,
    SetEventMask = 0x0205,
    SetUserClip = 0x0206,
    ClearUserClip = 0x0207,
    GetUserClip = 0x0208,
    GetClipRegion = 0x0209,
    Invalidate = 0x020A,

    // drawing state
    SetHighColor = 0x0280,
    SetLowColor = 0x0281,
    SetPenSize = 0x0282,
    SetDrawingMode = 0x0283,
    SetOrigin = 0x0284,
    SetScale = 0x0285,
    SetFont = 0x0286,
    PushState = 0x0287,
    PopState = 0x0288,

    // drawing
    StrokeLine = 0x0300,
    StrokeRect = 0x0301,
    FillRect = 0x0302,
    FillRegion = 0x0303,
    StrokeEllipse = 0x0304,
    FillEllipse = 0x0305,
    DrawString = 0x0306,
    DrawBitmap = 0x0307,
    DrawPicture = 0x0308,

    // picture recording
    BeginPicture = 0x0400,
    AppendToPicture = 0x0401,
    EndPicture = 0x0402,
    DeletePicture = 0x0403,

    // direct window
    DirectConnect = 0x0500,
    DirectDisconnect = 0x0501,

    // server to client
    Reply = 0x1000,
    Update = 0x1001,
    WindowActivated = 0x1002,
    WindowMoved = 0x1003,
    WindowResized = 0x1004,
    WorkspacesChanged = 0x1005,
    QuitRequested = 0x1006,
}

impl Opcode {
    /// Whether a client sending this opcode blocks on a reply. Known even
    /// when the message body fails to decode.
    pub fn expects_reply(self) -> bool {
        matches!(
            self,
            Opcode::GetDesktop
                | Opcode::CreateWindow
                | Opcode::SetWorkspace
                | Opcode::GetWorkspace
                | Opcode::CountWorkspaces
                | Opcode::CreateRootView
                | Opcode::CreateView
                | Opcode::CreateWorkspacesView
                | Opcode::SetSizeLimits
                | Opcode::GetSizeLimits
                | Opcode::GetWindowFrame
                | Opcode::GetWorkspaces
                | Opcode::Sync
                | Opcode::GetUserClip
                | Opcode::GetClipRegion
                | Opcode::EndPicture
                | Opcode::DirectConnect
        )
    }
}

/// How a drawing primitive combines with the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[repr(u32)]
pub enum DrawingMode {
    #[default]
    Copy = 0,
    Over = 1,
    Erase = 2,
    Invert = 3,
    Alpha = 4,
}

impl DrawingMode {
    pub fn from_u32(value: u32) -> Result<DrawingMode, ProtocolError> {
        Ok(match value {
            0 => DrawingMode::Copy,
            1 => DrawingMode::Over,
            2 => DrawingMode::Erase,
            3 => DrawingMode::Invert,
            4 => DrawingMode::Alpha,
            _ => {
                return Err(ProtocolError::InvalidValue {
                    field: "drawing_mode",
                    value: value as i64,
                })
            }
        })
    }
}

/// Requested size bounds, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SizeLimits {
    pub min_width: f32,
    pub max_width: f32,
    pub min_height: f32,
    pub max_height: f32,
}

impl SizeLimits {
    pub const UNLIMITED: SizeLimits = SizeLimits {
        min_width: 0.0,
        max_width: 32768.0,
        min_height: 0.0,
        max_height: 32768.0,
    };

    fn encode(&self, w: &mut AttachmentWriter) {
        w.f32(self.min_width)
            .f32(self.max_width)
            .f32(self.min_height)
            .f32(self.max_height);
    }

    fn decode(r: &mut AttachmentReader<'_>) -> Result<SizeLimits, ProtocolError> {
        Ok(SizeLimits {
            min_width: r.f32()?,
            max_width: r.f32()?,
            min_height: r.f32()?,
            max_height: r.f32()?,
        })
    }
}

/// Parameters of a new top-level window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSpec {
    pub frame: Rect,
    pub look: WindowLook,
    pub feel: WindowFeel,
    pub flags: WindowFlags,
    pub workspaces: u32,
    pub title: String,
    pub team: i32,
}

/// Parameters of a new view. `parent` is ignored for the root view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewSpec {
    pub token: u32,
    pub parent: u32,
    pub frame: Rect,
    pub event_mask: u32,
    pub hidden: bool,
}

impl ViewSpec {
    fn encode(&self, w: &mut AttachmentWriter) {
        w.u32(self.token)
            .u32(self.parent)
            .rect(self.frame)
            .u32(self.event_mask)
            .bool(self.hidden);
    }

    fn decode(r: &mut AttachmentReader<'_>) -> Result<ViewSpec, ProtocolError> {
        Ok(ViewSpec {
            token: r.u32()?,
            parent: r.u32()?,
            frame: r.rect()?,
            event_mask: r.u32()?,
            hidden: r.bool()?,
        })
    }
}

/// Drawing-state changes of the current view.
#[derive(Debug, Clone, PartialEq)]
pub enum StateOp {
    SetHighColor(Rgba),
    SetLowColor(Rgba),
    SetPenSize(f32),
    SetDrawingMode(DrawingMode),
    SetOrigin(PointF),
    SetScale(f32),
    SetFont(u32),
    PushState,
    PopState,
}

impl StateOp {
    pub fn opcode(&self) -> Opcode {
        match self {
            StateOp::SetHighColor(_) => Opcode::SetHighColor,
            StateOp::SetLowColor(_) => Opcode::SetLowColor,
            StateOp::SetPenSize(_) => Opcode::SetPenSize,
            StateOp::SetDrawingMode(_) => Opcode::SetDrawingMode,
            StateOp::SetOrigin(_) => Opcode::SetOrigin,
            StateOp::SetScale(_) => Opcode::SetScale,
            StateOp::SetFont(_) => Opcode::SetFont,
            StateOp::PushState => Opcode::PushState,
            StateOp::PopState => Opcode::PopState,
        }
    }

    pub fn encode(&self, w: &mut AttachmentWriter) {
        match self {
            StateOp::SetHighColor(c) | StateOp::SetLowColor(c) => {
                w.color(*c);
            }
            StateOp::SetPenSize(v) | StateOp::SetScale(v) => {
                w.f32(*v);
            }
            StateOp::SetDrawingMode(mode) => {
                w.u32(*mode as u32);
            }
            StateOp::SetOrigin(p) => {
                w.point_f(*p);
            }
            StateOp::SetFont(token) => {
                w.u32(*token);
            }
            StateOp::PushState | StateOp::PopState => {}
        }
    }

    /// Decodes the body of a state opcode; `None` if `op` is not one.
    pub fn decode(
        op: Opcode,
        r: &mut AttachmentReader<'_>,
    ) -> Result<Option<StateOp>, ProtocolError> {
        Ok(Some(match op {
            Opcode::SetHighColor => StateOp::SetHighColor(r.color()?),
            Opcode::SetLowColor => StateOp::SetLowColor(r.color()?),
            Opcode::SetPenSize => StateOp::SetPenSize(r.f32()?),
            Opcode::SetDrawingMode => StateOp::SetDrawingMode(DrawingMode::from_u32(r.u32()?)?),
            Opcode::SetOrigin => StateOp::SetOrigin(r.point_f()?),
            Opcode::SetScale => StateOp::SetScale(r.f32()?),
            Opcode::SetFont => StateOp::SetFont(r.u32()?),
            Opcode::PushState => StateOp::PushState,
            Opcode::PopState => StateOp::PopState,
            _ => return Ok(None),
        }))
    }
}

/// Drawing primitives, in the current view's coordinate space.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    StrokeLine { from: PointF, to: PointF },
    StrokeRect(RectF),
    FillRect(RectF),
    FillRegion(Region),
    StrokeEllipse(RectF),
    FillEllipse(RectF),
    DrawString { text: String, at: PointF },
    DrawBitmap { token: u32, source: RectF, dest: RectF },
    DrawPicture { token: u32, at: PointF },
}

impl DrawOp {
    pub fn opcode(&self) -> Opcode {
        match self {
            DrawOp::StrokeLine { .. } => Opcode::StrokeLine,
            DrawOp::StrokeRect(_) => Opcode::StrokeRect,
            DrawOp::FillRect(_) => Opcode::FillRect,
            DrawOp::FillRegion(_) => Opcode::FillRegion,
            DrawOp::StrokeEllipse(_) => Opcode::StrokeEllipse,
            DrawOp::FillEllipse(_) => Opcode::FillEllipse,
            DrawOp::DrawString { .. } => Opcode::DrawString,
            DrawOp::DrawBitmap { .. } => Opcode::DrawBitmap,
            DrawOp::DrawPicture { .. } => Opcode::DrawPicture,
        }
    }

    pub fn encode(&self, w: &mut AttachmentWriter) {
        match self {
            DrawOp::StrokeLine { from, to } => {
                w.point_f(*from).point_f(*to);
            }
            DrawOp::StrokeRect(r)
            | DrawOp::FillRect(r)
            | DrawOp::StrokeEllipse(r)
            | DrawOp::FillEllipse(r) => {
                w.rect_f(*r);
            }
            DrawOp::FillRegion(region) => {
                w.region(region);
            }
            DrawOp::DrawString { text, at } => {
                w.string(text).point_f(*at);
            }
            DrawOp::DrawBitmap { token, source, dest } => {
                w.u32(*token).rect_f(*source).rect_f(*dest);
            }
            DrawOp::DrawPicture { token, at } => {
                w.u32(*token).point_f(*at);
            }
        }
    }

    /// Decodes the body of a drawing opcode; `None` if `op` is not one.
    pub fn decode(op: Opcode, r: &mut AttachmentReader<'_>) -> Result<Option<DrawOp>, ProtocolError> {
        Ok(Some(match op {
            Opcode::StrokeLine => DrawOp::StrokeLine {
                from: r.point_f()?,
                to: r.point_f()?,
            },
            Opcode::StrokeRect => DrawOp::StrokeRect(r.rect_f()?),
            Opcode::FillRect => DrawOp::FillRect(r.rect_f()?),
            Opcode::FillRegion => DrawOp::FillRegion(r.region()?),
            Opcode::StrokeEllipse => DrawOp::StrokeEllipse(r.rect_f()?),
            Opcode::FillEllipse => DrawOp::FillEllipse(r.rect_f()?),
            Opcode::DrawString => DrawOp::DrawString {
                text: r.string()?,
                at: r.point_f()?,
            },
            Opcode::DrawBitmap => DrawOp::DrawBitmap {
                token: r.u32()?,
                source: r.rect_f()?,
                dest: r.rect_f()?,
            },
            Opcode::DrawPicture => DrawOp::DrawPicture {
                token: r.u32()?,
                at: r.point_f()?,
            },
            _ => return Ok(None),
        }))
    }
}

/// A decoded client request.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    GetDesktop { user_id: i32 },
    CreateWindow(WindowSpec),
    SetWorkspace { index: u32 },
    GetWorkspace,
    CountWorkspaces,

    CreateRootView(ViewSpec),
    CreateView(ViewSpec),
    CreateWorkspacesView(ViewSpec),
    DeleteView { token: u32 },
    SetCurrentView { token: u32 },
    ShowWindow,
    HideWindow,
    ActivateWindow,
    QuitWindow,
    MoveWindowBy { dx: i32, dy: i32 },
    MoveWindowTo { to: Point },
    ResizeWindowBy { dx: i32, dy: i32 },
    ResizeWindowTo { width: i32, height: i32 },
    SetSizeLimits(SizeLimits),
    GetSizeLimits,
    GetWindowFrame,
    SetWorkspaces { mask: u32 },
    GetWorkspaces,
    SetTitle { title: String },
    SetLook { look: WindowLook },
    SetFeel { feel: WindowFeel },
    SetFlags { flags: WindowFlags },
    AddToSubset { window: u32 },
    RemoveFromSubset { window: u32 },
    Sync,

    MoveViewTo { to: Point },
    ResizeViewTo { width: i32, height: i32 },
    ScrollViewTo { to: Point },
    HideView,
    ShowView,
    SetEventMask { mask: u32 },
    SetUserClip { clip: Region },
    ClearUserClip,
    GetUserClip,
    GetClipRegion,
    Invalidate { rect: Rect },

    State(StateOp),
    Draw(DrawOp),

    BeginPicture,
    AppendToPicture { token: u32 },
    EndPicture,
    DeletePicture { token: u32 },

    DirectConnect,
    DirectDisconnect,
}

impl Request {
    pub fn opcode(&self) -> Opcode {
        match self {
            Request::GetDesktop { .. } => Opcode::GetDesktop,
            Request::CreateWindow(_) => Opcode::CreateWindow,
            Request::SetWorkspace { .. } => Opcode::SetWorkspace,
            Request::GetWorkspace => Opcode::GetWorkspace,
            Request::CountWorkspaces => Opcode::CountWorkspaces,
            Request::CreateRootView(_) => Opcode::CreateRootView,
            Request::CreateView(_) => Opcode::CreateView,
            Request::CreateWorkspacesView(_) => Opcode::CreateWorkspacesView,
            Request::DeleteView { .. } => Opcode::DeleteView,
            Request::SetCurrentView { .. } => Opcode::SetCurrentView,
            Request::ShowWindow => Opcode::ShowWindow,
            Request::HideWindow => Opcode::HideWindow,
            Request::ActivateWindow => Opcode::ActivateWindow,
            Request::QuitWindow => Opcode::QuitWindow,
            Request::MoveWindowBy { .. } => Opcode::MoveWindowBy,
            Request::MoveWindowTo { .. } => Opcode::MoveWindowTo,
            Request::ResizeWindowBy { .. } => Opcode::ResizeWindowBy,
            Request::ResizeWindowTo { .. } => Opcode::ResizeWindowTo,
            Request::SetSizeLimits(_) => Opcode::SetSizeLimits,
            Request::GetSizeLimits => Opcode::GetSizeLimits,
            Request::GetWindowFrame => Opcode::GetWindowFrame,
            Request::SetWorkspaces { .. } => Opcode::SetWorkspaces,
            Request::GetWorkspaces => Opcode::GetWorkspaces,
            Request::SetTitle { .. } => Opcode::SetTitle,
            Request::SetLook { .. } => Opcode::SetLook,
            Request::SetFeel { .. } => Opcode::SetFeel,
            Request::SetFlags { .. } => Opcode::SetFlags,
            Request::AddToSubset { .. } => Opcode::AddToSubset,
            Request::RemoveFromSubset { .. } => Opcode::RemoveFromSubset,
            Request::Sync => Opcode::Sync,
            Request::MoveViewTo { .. } => Opcode::MoveViewTo,
            Request::ResizeViewTo { .. } => Opcode::ResizeViewTo,
            Request::ScrollViewTo { .. } => Opcode::ScrollViewTo,
            Request::HideView => Opcode::HideView,
            Request::ShowView => Opcode::ShowView,
            Request::SetEventMask { .. } => Opcode::SetEventMask,
            Request::SetUserClip { .. } => Opcode::SetUserClip,
            Request::ClearUserClip => Opcode::ClearUserClip,
            Request::GetUserClip => Opcode::GetUserClip,
            Request::GetClipRegion => Opcode::GetClipRegion,
            Request::Invalidate { .. } => Opcode::Invalidate,
            Request::State(op) => op.opcode(),
            Request::Draw(op) => op.opcode(),
            Request::BeginPicture => Opcode::BeginPicture,
            Request::AppendToPicture { .. } => Opcode::AppendToPicture,
            Request::EndPicture => Opcode::EndPicture,
            Request::DeletePicture { .. } => Opcode::DeletePicture,
            Request::DirectConnect => Opcode::DirectConnect,
            Request::DirectDisconnect => Opcode::DirectDisconnect,
        }
    }

    /// Whether the client blocks on a reply to this request.
    pub fn expects_reply(&self) -> bool {
        self.opcode().expects_reply()
    }

    /// Whether the request changes the window list, z-order, geometry or
    /// workspace membership and so needs the structural write lock.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Request::ShowWindow
                | Request::HideWindow
                | Request::ActivateWindow
                | Request::QuitWindow
                | Request::MoveWindowBy { .. }
                | Request::MoveWindowTo { .. }
                | Request::ResizeWindowBy { .. }
                | Request::ResizeWindowTo { .. }
                | Request::SetSizeLimits(_)
                | Request::SetWorkspaces { .. }
                | Request::SetTitle { .. }
                | Request::SetLook { .. }
                | Request::SetFeel { .. }
                | Request::SetFlags { .. }
                | Request::AddToSubset { .. }
                | Request::RemoveFromSubset { .. }
        )
    }

    /// Whether the request targets the view tree rather than the window.
    pub fn needs_root_view(&self) -> bool {
        matches!(
            self,
            Request::CreateView(_)
                | Request::CreateWorkspacesView(_)
                | Request::DeleteView { .. }
                | Request::SetCurrentView { .. }
                | Request::MoveViewTo { .. }
                | Request::ResizeViewTo { .. }
                | Request::ScrollViewTo { .. }
                | Request::HideView
                | Request::ShowView
                | Request::SetEventMask { .. }
                | Request::SetUserClip { .. }
                | Request::ClearUserClip
                | Request::GetUserClip
                | Request::GetClipRegion
                | Request::Invalidate { .. }
                | Request::State(_)
                | Request::Draw(_)
                | Request::BeginPicture
                | Request::AppendToPicture { .. }
                | Request::EndPicture
                | Request::DirectConnect
        )
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = AttachmentWriter::new();
        match self {
            Request::GetDesktop { user_id } => {
                w.i32(*user_id);
            }
            Request::CreateWindow(spec) => {
                w.rect(spec.frame)
                    .u32(spec.look as u32)
                    .u32(spec.feel as u32)
                    .u32(spec.flags.bits())
                    .u32(spec.workspaces)
                    .string(&spec.title)
                    .i32(spec.team);
            }
            Request::SetWorkspace { index } => {
                w.u32(*index);
            }
            Request::CreateRootView(spec)
            | Request::CreateView(spec)
            | Request::CreateWorkspacesView(spec) => spec.encode(&mut w),
            Request::DeleteView { token }
            | Request::SetCurrentView { token }
            | Request::AppendToPicture { token }
            | Request::DeletePicture { token } => {
                w.u32(*token);
            }
            Request::MoveWindowBy { dx, dy } | Request::ResizeWindowBy { dx, dy } => {
                w.i32(*dx).i32(*dy);
            }
            Request::MoveWindowTo { to } | Request::MoveViewTo { to } | Request::ScrollViewTo { to } => {
                w.point(*to);
            }
            Request::ResizeWindowTo { width, height } | Request::ResizeViewTo { width, height } => {
                w.i32(*width).i32(*height);
            }
            Request::SetSizeLimits(limits) => limits.encode(&mut w),
            Request::SetWorkspaces { mask } | Request::SetEventMask { mask } => {
                w.u32(*mask);
            }
            Request::SetTitle { title } => {
                w.string(title);
            }
            Request::SetLook { look } => {
                w.u32(*look as u32);
            }
            Request::SetFeel { feel } => {
                w.u32(*feel as u32);
            }
            Request::SetFlags { flags } => {
                w.u32(flags.bits());
            }
            Request::AddToSubset { window } | Request::RemoveFromSubset { window } => {
                w.u32(*window);
            }
            Request::SetUserClip { clip } => {
                w.region(clip);
            }
            Request::Invalidate { rect } => {
                w.rect(*rect);
            }
            Request::State(op) => op.encode(&mut w),
            Request::Draw(op) => op.encode(&mut w),
            Request::GetWorkspace
            | Request::CountWorkspaces
            | Request::ShowWindow
            | Request::HideWindow
            | Request::ActivateWindow
            | Request::QuitWindow
            | Request::GetSizeLimits
            | Request::GetWindowFrame
            | Request::GetWorkspaces
            | Request::Sync
            | Request::HideView
            | Request::ShowView
            | Request::ClearUserClip
            | Request::GetUserClip
            | Request::GetClipRegion
            | Request::BeginPicture
            | Request::EndPicture
            | Request::DirectConnect
            | Request::DirectDisconnect => {}
        }
        w.finish()
    }

    pub fn to_message(&self) -> Message {
        Message::new(self.opcode() as u32, self.encode())
    }

    /// Decodes a request message. Trailing bytes are an error.
    pub fn decode(code: u32, data: &[u8]) -> Result<Request, ProtocolError> {
        let op = Opcode::from_u32(code).ok_or(ProtocolError::UnknownOpcode(code))?;
        let mut r = AttachmentReader::new(data);
        let request = Self::decode_body(op, &mut r)?;
        r.finish()?;
        Ok(request)
    }

    fn decode_body(op: Opcode, r: &mut AttachmentReader<'_>) -> Result<Request, ProtocolError> {
        Ok(match op {
            Opcode::GetDesktop => Request::GetDesktop { user_id: r.i32()? },
            Opcode::CreateWindow => Request::CreateWindow(WindowSpec {
                frame: r.rect()?,
                look: WindowLook::from_u32(r.u32()?)?,
                feel: WindowFeel::from_u32(r.u32()?)?,
                flags: WindowFlags::from_bits_truncate(r.u32()?),
                workspaces: r.u32()?,
                title: r.string()?,
                team: r.i32()?,
            }),
            Opcode::SetWorkspace => Request::SetWorkspace { index: r.u32()? },
            Opcode::GetWorkspace => Request::GetWorkspace,
            Opcode::CountWorkspaces => Request::CountWorkspaces,
            Opcode::CreateRootView => Request::CreateRootView(ViewSpec::decode(r)?),
            Opcode::CreateView => Request::CreateView(ViewSpec::decode(r)?),
            Opcode::CreateWorkspacesView => Request::CreateWorkspacesView(ViewSpec::decode(r)?),
            Opcode::DeleteView => Request::DeleteView { token: r.u32()? },
            Opcode::SetCurrentView => Request::SetCurrentView { token: r.u32()? },
            Opcode::ShowWindow => Request::ShowWindow,
            Opcode::HideWindow => Request::HideWindow,
            Opcode::ActivateWindow => Request::ActivateWindow,
            Opcode::QuitWindow => Request::QuitWindow,
            Opcode::MoveWindowBy => Request::MoveWindowBy {
                dx: r.i32()?,
                dy: r.i32()?,
            },
            Opcode::MoveWindowTo => Request::MoveWindowTo { to: r.point()? },
            Opcode::ResizeWindowBy => Request::ResizeWindowBy {
                dx: r.i32()?,
                dy: r.i32()?,
            },
            Opcode::ResizeWindowTo => Request::ResizeWindowTo {
                width: r.i32()?,
                height: r.i32()?,
            },
            Opcode::SetSizeLimits => Request::SetSizeLimits(SizeLimits::decode(r)?),
            Opcode::GetSizeLimits => Request::GetSizeLimits,
            Opcode::GetWindowFrame => Request::GetWindowFrame,
            Opcode::SetWorkspaces => Request::SetWorkspaces { mask: r.u32()? },
            Opcode::GetWorkspaces => Request::GetWorkspaces,
            Opcode::SetTitle => Request::SetTitle { title: r.string()? },
            Opcode::SetLook => Request::SetLook {
                look: WindowLook::from_u32(r.u32()?)?,
            },
            Opcode::SetFeel => Request::SetFeel {
                feel: WindowFeel::from_u32(r.u32()?)?,
            },
            Opcode::SetFlags => Request::SetFlags {
                flags: WindowFlags::from_bits_truncate(r.u32()?),
            },
            Opcode::AddToSubset => Request::AddToSubset { window: r.u32()? },
            Opcode::RemoveFromSubset => Request::RemoveFromSubset { window: r.u32()? },
            Opcode::Sync => Request::Sync,
            Opcode::MoveViewTo => Request::MoveViewTo { to: r.point()? },
            Opcode::ResizeViewTo => Request::ResizeViewTo {
                width: r.i32()?,
                height: r.i32()?,
            },
            Opcode::ScrollViewTo => Request::ScrollViewTo { to: r.point()? },
            Opcode::HideView => Request::HideView,
            Opcode::ShowView => Request::ShowView,
            Opcode::SetEventMask => Request::SetEventMask { mask: r.u32()? },
            Opcode::SetUserClip => Request::SetUserClip { clip: r.region()? },
            Opcode::ClearUserClip => Request::ClearUserClip,
            Opcode::GetUserClip => Request::GetUserClip,
            Opcode::GetClipRegion => Request::GetClipRegion,
            Opcode::Invalidate => Request::Invalidate { rect: r.rect()? },
            Opcode::BeginPicture => Request::BeginPicture,
            Opcode::AppendToPicture => Request::AppendToPicture { token: r.u32()? },
            Opcode::EndPicture => Request::EndPicture,
            Opcode::DeletePicture => Request::DeletePicture { token: r.u32()? },
            Opcode::DirectConnect => Request::DirectConnect,
            Opcode::DirectDisconnect => Request::DirectDisconnect,
            Opcode::SetHighColor
            | Opcode::SetLowColor
            | Opcode::SetPenSize
            | Opcode::SetDrawingMode
            | Opcode::SetOrigin
            | Opcode::SetScale
            | Opcode::SetFont
            | Opcode::PushState
            | Opcode::PopState => match StateOp::decode(op, r)? {
                Some(state) => Request::State(state),
                None => return Err(ProtocolError::NotARequest(op)),
            },
            Opcode::StrokeLine
            | Opcode::StrokeRect
            | Opcode::FillRect
            | Opcode::FillRegion
            | Opcode::StrokeEllipse
            | Opcode::FillEllipse
            | Opcode::DrawString
            | Opcode::DrawBitmap
            | Opcode::DrawPicture => match DrawOp::decode(op, r)? {
                Some(draw) => Request::Draw(draw),
                None => return Err(ProtocolError::NotARequest(op)),
            },
            Opcode::Reply
            | Opcode::Update
            | Opcode::WindowActivated
            | Opcode::WindowMoved
            | Opcode::WindowResized
            | Opcode::WorkspacesChanged
            | Opcode::QuitRequested => return Err(ProtocolError::NotARequest(op)),
        })
    }
}

/// Starts a reply attachment stream with its status.
pub fn reply(status: Status) -> AttachmentWriter {
    let mut w = AttachmentWriter::new();
    w.i32(status.code());
    w
}

pub fn reply_message(w: AttachmentWriter) -> Message {
    Message::new(Opcode::Reply as u32, w.finish())
}

/// Reply to a size-limits request: status, frame, then the effective limits.
pub fn size_limits_reply(frame: Rect, limits: &SizeLimits) -> AttachmentWriter {
    let mut w = reply(Status::Ok);
    w.rect(frame);
    limits.encode(&mut w);
    w
}

/// Reply carrying a clipping region: status, rectangle count, rectangles.
pub fn clip_reply(region: &Region) -> AttachmentWriter {
    let mut w = reply(Status::Ok);
    w.region(region);
    w
}
