//! Per-window protocol endpoint
//!
//! A [`ServerWindow`] owns one window's connection: it receives the
//! client's requests on its own port, decodes them into [`Request`]s and
//! runs them against the desktop, one thread per window.
//!
//! Queued requests are taken in batches of up to `server.batch_size`.
//! Within a batch, consecutive requests of the same kind share one lock
//! acquisition: structural requests run under the desktop's write token,
//! everything else (view tree, drawing, queries) under a read token, and the
//! direct-window handshake outside both.
//!
//! Connection states:
//!
//! ```text
//! WaitingForRootView --CreateRootView--> Running --DirectConnect--> DirectConnected
//!         |                                 |  <---DirectDisconnect/timeout---|
//!         +---------------------------------+------------------------------> Closing
//! ```

use log::{debug, info, trace, warn};
use std::sync::Arc;

use crate::desktop::{Desktop, DesktopState};
use crate::direct::{BufferFlags, BufferState, DirectWindowSession};
use crate::error::{ProtocolError, ServerError, Status};
use crate::geometry::{PointF, Rect, RectF};
use crate::ipc::{AttachmentWriter, Message, PortHandle, PortReceiver};
use crate::picture::{PictureOp, PictureRecorder};
use crate::protocol::{self, DrawOp, Opcode, Request, StateOp, ViewSpec, WindowSpec};
use crate::region::Region;
use crate::view::{EventMask, ViewKind, ViewToken, ViewTree};
use crate::window::{WindowId, WindowLayer};

/// Nesting limit for pictures that draw other pictures.
const MAX_PICTURE_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    WaitingForRootView,
    Running,
    DirectConnected,
    Closing,
}

/// Which lock a request runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lane {
    Read,
    Structural,
    Unlocked,
}

impl Lane {
    /// Whether a decoded message joins a run of `lane` requests.
    fn holds(decoded: &Result<Request, ProtocolError>, lane: Lane) -> bool {
        decoded.as_ref().is_ok_and(|request| Lane::of(request) == lane)
    }

    fn of(request: &Request) -> Lane {
        match request {
            Request::DirectConnect
            | Request::DirectDisconnect
            | Request::QuitWindow
            | Request::GetDesktop { .. }
            | Request::CreateWindow(_)
            | Request::SetWorkspace { .. }
            | Request::GetWorkspace
            | Request::CountWorkspaces => Lane::Unlocked,
            request if request.is_structural() => Lane::Structural,
            _ => Lane::Read,
        }
    }
}

type Reply = Result<Option<AttachmentWriter>, ServerError>;

pub struct ServerWindow {
    id: WindowId,
    desktop: Arc<Desktop>,
    client: PortHandle,
    state: ConnectionState,
    current_view: Option<ViewToken>,
    recorder: PictureRecorder,
    direct: Option<Arc<DirectWindowSession>>,
    batch_size: usize,
    closed: bool,
}

impl std::fmt::Debug for ServerWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerWindow")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("current_view", &self.current_view)
            .finish()
    }
}

impl ServerWindow {
    /// Adds the window to `desktop`. Replies and events go to `client`.
    pub fn new(desktop: Arc<Desktop>, spec: &WindowSpec, client: PortHandle) -> Result<Self, ServerError> {
        let id = desktop.write(|state| state.add_window(spec, Some(client.clone())))?;
        let batch_size = desktop.config().server.batch_size.max(1);
        Ok(Self {
            id,
            desktop,
            client,
            state: ConnectionState::WaitingForRootView,
            current_view: None,
            recorder: PictureRecorder::new(),
            direct: None,
            batch_size,
            closed: false,
        })
    }

    pub fn id(&self) -> WindowId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn current_view(&self) -> Option<ViewToken> {
        self.current_view
    }

    /// Serves the connection until the client quits or its port vanishes,
    /// then removes the window.
    pub fn run(mut self, mut receiver: PortReceiver) {
        info!("window {} connection open on port {}", self.id, receiver.id());
        let mut lost = false;
        while !lost && self.state != ConnectionState::Closing {
            let Some(first) = receiver.recv() else {
                break;
            };
            let mut batch = vec![first];
            while batch.len() < self.batch_size {
                match receiver.try_recv() {
                    Ok(Some(message)) => batch.push(message),
                    Ok(None) => break,
                    Err(_) => {
                        lost = true;
                        break;
                    }
                }
            }
            self.process_batch(batch);
        }
        if self.state != ConnectionState::Closing {
            debug!("window {}: request port vanished", self.id);
        }
        self.close();
    }

    /// Runs one batch of queued messages in arrival order. Messages are
    /// decoded as they are reached, so a malformed one is answered in its
    /// turn and sees the connection state left by the requests before it.
    pub fn process_batch(&mut self, messages: Vec<Message>) {
        self.check_direct();
        let desktop = self.desktop.clone();
        let mut pending = messages
            .iter()
            .map(|message| (message.code, Request::decode(message.code, &message.data)))
            .peekable();

        while let Some((code, decoded)) = pending.next() {
            if self.state == ConnectionState::Closing {
                break;
            }
            let request = match decoded {
                Ok(request) => request,
                Err(err) => {
                    self.reject(code, err);
                    continue;
                }
            };
            match Lane::of(&request) {
                Lane::Unlocked => self.handle_unlocked(request),
                Lane::Structural => desktop.write(|state| {
                    self.handle_structural(state, request);
                    while self.state != ConnectionState::Closing {
                        let Some((_, Ok(next))) = pending.next_if(|(_, d)| Lane::holds(d, Lane::Structural)) else {
                            break;
                        };
                        self.handle_structural(state, next);
                    }
                }),
                Lane::Read => {
                    let state = desktop.read();
                    self.handle_read(&state, request);
                    while self.state != ConnectionState::Closing {
                        let Some((_, Ok(next))) = pending.next_if(|(_, d)| Lane::holds(d, Lane::Read)) else {
                            break;
                        };
                        self.handle_read(&state, next);
                    }
                }
            }
        }

        // events posted by the desktop fail silently; notice the loss here
        if self.state != ConnectionState::Closing && self.client.is_closed() {
            debug!("window {}: client port vanished", self.id);
            self.state = ConnectionState::Closing;
        }
    }

    fn reject(&mut self, code: u32, err: ProtocolError) {
        if matches!(err, ProtocolError::UnknownOpcode(_)) && self.state == ConnectionState::WaitingForRootView {
            debug!("window {}: dropping unknown opcode {:#x} before root view", self.id, code);
            return;
        }
        warn!("window {}: bad message {:#x}: {}", self.id, code, err);
        if Opcode::from_u32(code).is_some_and(Opcode::expects_reply) {
            self.send(protocol::reply(ServerError::from(err).status()));
        }
    }

    /// Whether the request may run in the current connection state.
    fn admit(&mut self, request: &Request) -> bool {
        trace!("window {} <- {:?}", self.id, request.opcode());
        if self.state != ConnectionState::WaitingForRootView || !request.needs_root_view() {
            return true;
        }
        if request.expects_reply() {
            self.send(protocol::reply(ServerError::NoRootView.status()));
        } else {
            debug!("window {}: {:?} before root view dropped", self.id, request.opcode());
        }
        false
    }

    /// Losing the client's port closes the connection.
    fn send(&mut self, reply: AttachmentWriter) {
        if self.client.send(protocol::reply_message(reply)).is_err() {
            debug!("window {}: reply dropped, client port closed", self.id);
            self.state = ConnectionState::Closing;
        }
    }

    fn finish(&mut self, opcode: Opcode, result: Reply) {
        match result {
            Ok(Some(reply)) => self.send(reply),
            Ok(None) if opcode.expects_reply() => self.send(protocol::reply(Status::Ok)),
            Ok(None) => {}
            Err(err) => {
                debug!("window {}: {:?} failed: {}", self.id, opcode, err);
                if opcode.expects_reply() {
                    self.send(protocol::reply(err.status()));
                }
            }
        }
    }

    fn handle_unlocked(&mut self, request: Request) {
        if !self.admit(&request) {
            return;
        }
        let opcode = request.opcode();
        match request {
            Request::QuitWindow => {
                debug!("window {}: quit requested", self.id);
                self.state = ConnectionState::Closing;
            }
            Request::DirectConnect => self.direct_connect(),
            Request::DirectDisconnect => {
                let result = self.direct_disconnect().map(|_| None);
                self.finish(opcode, result);
            }
            _ => self.finish(opcode, Err(ServerError::NotAllowed("session request on a window port"))),
        }
    }

    fn handle_structural(&mut self, state: &mut DesktopState, request: Request) {
        if !self.admit(&request) {
            return;
        }
        let opcode = request.opcode();
        let id = self.id;
        let result = match request {
            Request::ShowWindow => state.show_window(id).map(|_| None),
            Request::HideWindow => state.hide_window(id).map(|_| None),
            Request::ActivateWindow => state.activate_window(id).map(|_| None),
            Request::MoveWindowBy { dx, dy } => state.move_window_by(id, dx, dy).map(|_| None),
            Request::MoveWindowTo { to } => state.move_window_to(id, to).map(|_| None),
            Request::ResizeWindowBy { dx, dy } => state.resize_window_by(id, dx, dy).map(|_| None),
            Request::ResizeWindowTo { width, height } => state.resize_window_to(id, width, height).map(|_| None),
            Request::SetSizeLimits(limits) => state
                .set_size_limits(id, limits)
                .map(|(frame, limits)| Some(protocol::size_limits_reply(frame, &limits))),
            Request::SetWorkspaces { mask } => state.set_window_workspaces(id, mask).map(|_| None),
            Request::SetTitle { title } => state.set_title(id, title).map(|_| None),
            Request::SetLook { look } => state.set_look(id, look).map(|_| None),
            Request::SetFeel { feel } => state.set_feel(id, feel).map(|_| None),
            Request::SetFlags { flags } => state.set_flags(id, flags).map(|_| None),
            Request::AddToSubset { window } => state.add_to_subset(id, WindowId(window)).map(|_| None),
            Request::RemoveFromSubset { window } => state.remove_from_subset(id, WindowId(window)).map(|_| None),
            _ => Err(ServerError::NotAllowed("request not valid here")),
        };
        self.finish(opcode, result);
    }

    fn handle_read(&mut self, state: &DesktopState, request: Request) {
        if !self.admit(&request) {
            return;
        }
        let opcode = request.opcode();
        let result = match state.window(self.id) {
            Some(window) => self.read_request(state, window, request),
            None => Err(ServerError::WindowGone(self.id.0)),
        };
        self.finish(opcode, result);
    }

    fn read_request(&mut self, state: &DesktopState, window: &WindowLayer, request: Request) -> Reply {
        match request {
            Request::CreateRootView(spec) => self.create_root_view(state, window, &spec),
            Request::CreateView(spec) => self.create_view(state, window, &spec, ViewKind::Normal),
            Request::CreateWorkspacesView(spec) => self.create_view(state, window, &spec, ViewKind::Workspaces),
            Request::DeleteView { token } => self.delete_view(state, window, ViewToken(token)),
            Request::SetCurrentView { token } => {
                let token = ViewToken(token);
                if window.views().get(token).is_none() {
                    return Err(ServerError::BadViewToken(token.0));
                }
                self.current_view = Some(token);
                Ok(None)
            }
            Request::MoveViewTo { to } => self.reshape_view(state, window, |views, view| views.move_to(view, to)),
            Request::ResizeViewTo { width, height } => {
                self.reshape_view(state, window, |views, view| views.resize_to(view, width, height))
            }
            Request::ScrollViewTo { to } => self.reshape_view(state, window, |views, view| views.scroll_to(view, to)),
            Request::HideView => self.reshape_view(state, window, |views, view| views.set_hidden(view, true)),
            Request::ShowView => self.reshape_view(state, window, |views, view| views.set_hidden(view, false)),
            Request::SetEventMask { mask } => {
                let view = self.view()?;
                let mask = EventMask::from_bits_truncate(mask);
                window.views().set_event_mask(view, mask)?;
                if mask.is_empty() {
                    self.desktop.remove_listener(self.id, view);
                } else {
                    self.desktop.add_listener(self.id, view, mask);
                }
                Ok(None)
            }
            Request::SetUserClip { clip } => {
                window.views().set_user_clip(self.view()?, Some(&clip))?;
                Ok(None)
            }
            Request::ClearUserClip => {
                window.views().set_user_clip(self.view()?, None)?;
                Ok(None)
            }
            Request::GetUserClip => {
                let view = self.view()?;
                let views = window.views();
                let layer = views.get(view).ok_or(ServerError::BadViewToken(view.0))?;
                let clip = layer.user_clip().unwrap_or_else(|| {
                    Region::from_rect(Rect::from_size(
                        layer.scroll.x,
                        layer.scroll.y,
                        layer.frame.width(),
                        layer.frame.height(),
                    ))
                });
                Ok(Some(protocol::clip_reply(&clip)))
            }
            Request::GetClipRegion => {
                let view = self.view()?;
                let origin = window.frame().left_top();
                let mut views = window.views();
                let local = views
                    .local_origin(view, origin)
                    .ok_or(ServerError::BadViewToken(view.0))?;
                let clip = views
                    .clip_of(view, window.clip_generation(), origin, window.content_clip())
                    .drawing;
                Ok(Some(protocol::clip_reply(&clip.offset_by(-local.x, -local.y))))
            }
            Request::Invalidate { rect } => {
                let view = self.view()?;
                let region = {
                    let origin = window.frame().left_top();
                    let mut views = window.views();
                    let local = views
                        .local_origin(view, origin)
                        .ok_or(ServerError::BadViewToken(view.0))?;
                    views
                        .clip_of(view, window.clip_generation(), origin, window.content_clip())
                        .visible
                        .intersect_rect(rect.offset_by(local.x, local.y))
                };
                state.request_update(self.id, &region);
                Ok(None)
            }
            Request::State(op) => {
                let view = self.view()?;
                match self.recorder.target_for(view) {
                    Some(picture) => picture.record(&PictureOp::State(op)),
                    None => window.views().apply_state(view, &op)?,
                }
                Ok(None)
            }
            Request::Draw(op) => {
                let view = self.view()?;
                if let Some(picture) = self.recorder.target_for(view) {
                    picture.record(&PictureOp::Draw(op));
                    return Ok(None);
                }
                if window.is_hidden() {
                    trace!("window {}: hidden, {:?} dropped", self.id, op.opcode());
                    return Ok(None);
                }
                self.draw(window, view, &op, 0)?;
                Ok(None)
            }
            Request::BeginPicture => {
                let view = self.view()?;
                self.recorder.begin(view, None);
                Ok(None)
            }
            Request::AppendToPicture { token } => {
                let view = self.view()?;
                let base = self
                    .desktop
                    .resources()
                    .pictures
                    .get(token)
                    .ok_or(ServerError::BadToken(token))?;
                self.recorder.begin(view, Some((token, (*base).clone())));
                Ok(None)
            }
            Request::EndPicture => {
                let recording = self
                    .recorder
                    .end()
                    .ok_or(ServerError::NotAllowed("no picture is being recorded"))?;
                let pictures = &self.desktop.resources().pictures;
                let token = match recording.append_to {
                    Some(token) => {
                        pictures.replace(token, recording.picture)?;
                        token
                    }
                    None => pictures.insert(recording.picture)?,
                };
                debug!("window {}: picture {} recorded", self.id, token);
                let mut reply = protocol::reply(Status::Ok);
                reply.u32(token);
                Ok(Some(reply))
            }
            Request::DeletePicture { token } => {
                self.desktop
                    .resources()
                    .pictures
                    .remove(token)
                    .ok_or(ServerError::BadToken(token))?;
                Ok(None)
            }
            Request::Sync => Ok(None),
            Request::GetSizeLimits => Ok(Some(protocol::size_limits_reply(window.frame(), &window.limits()))),
            Request::GetWindowFrame => {
                let mut reply = protocol::reply(Status::Ok);
                reply.rect(window.frame());
                Ok(Some(reply))
            }
            Request::GetWorkspaces => {
                let mut reply = protocol::reply(Status::Ok);
                reply.u32(window.workspaces());
                Ok(Some(reply))
            }
            _ => Err(ServerError::NotAllowed("request not valid here")),
        }
    }

    fn view(&self) -> Result<ViewToken, ServerError> {
        self.current_view.ok_or(ServerError::NoRootView)
    }

    fn create_root_view(&mut self, state: &DesktopState, window: &WindowLayer, spec: &ViewSpec) -> Reply {
        if self.state != ConnectionState::WaitingForRootView {
            return Err(ServerError::RootViewExists);
        }
        let token = window.views().create_root(spec)?;
        self.current_view = Some(token);
        self.state = ConnectionState::Running;
        self.listen(token, spec.event_mask);
        info!("window {}: root view {} created", self.id, token.0);
        state.request_update(self.id, window.content_clip());
        Ok(None)
    }

    fn create_view(&mut self, state: &DesktopState, window: &WindowLayer, spec: &ViewSpec, kind: ViewKind) -> Reply {
        let frame = {
            let mut views = window.views();
            let token = views.create_child(spec, kind)?;
            views.screen_frame(token, window.frame().left_top())
        };
        self.listen(ViewToken(spec.token), spec.event_mask);
        debug!("window {}: {:?} view {} created", self.id, kind, spec.token);
        match kind {
            ViewKind::Workspaces => state.redraw_workspaces_views(Some(self.id)),
            ViewKind::Normal => {
                if let Some(frame) = frame {
                    state.request_update(self.id, &Region::from_rect(frame));
                }
            }
        }
        Ok(None)
    }

    fn listen(&self, view: ViewToken, mask: u32) {
        let mask = EventMask::from_bits_truncate(mask);
        if !mask.is_empty() {
            self.desktop.add_listener(self.id, view, mask);
        }
    }

    fn delete_view(&mut self, state: &DesktopState, window: &WindowLayer, token: ViewToken) -> Reply {
        let (frame, removed, root) = {
            let mut views = window.views();
            let frame = views.screen_frame(token, window.frame().left_top());
            let removed = views.delete(token)?;
            (frame, removed, views.root())
        };
        for view in &removed {
            self.recorder.detach_view(*view);
            self.desktop.remove_listener(self.id, *view);
        }
        if self.current_view.is_some_and(|current| removed.contains(&current)) {
            self.current_view = root;
        }
        if let Some(frame) = frame {
            state.request_update(self.id, &Region::from_rect(frame));
        }
        Ok(None)
    }

    /// Applies a geometry change to the current view and repaints the area
    /// it covered before and after.
    fn reshape_view(
        &mut self,
        state: &DesktopState,
        window: &WindowLayer,
        change: impl FnOnce(&mut ViewTree, ViewToken) -> Result<(), ServerError>,
    ) -> Reply {
        let view = self.view()?;
        let origin = window.frame().left_top();
        let dirty = {
            let mut views = window.views();
            let before = views.screen_frame(view, origin);
            change(&mut *views, view)?;
            let after = views.screen_frame(view, origin);
            [before, after]
                .into_iter()
                .flatten()
                .fold(Region::new(), |dirty, frame| dirty.union_rect(frame))
        };
        state.request_update(self.id, &dirty);
        Ok(None)
    }

    /// Executes one drawing primitive in `view`.
    fn draw(&self, window: &WindowLayer, view: ViewToken, op: &DrawOp, depth: usize) -> Result<(), ServerError> {
        if let DrawOp::DrawPicture { token, at } = op {
            return self.replay_picture(window, view, *token, *at, depth);
        }

        let origin = window.frame().left_top();
        let mut views = window.views();
        let local = views
            .local_origin(view, origin)
            .ok_or(ServerError::BadViewToken(view.0))?;
        let clip = views
            .clip_of(view, window.clip_generation(), origin, window.content_clip())
            .drawing;
        if clip.is_empty() {
            return Ok(());
        }
        let layer = views.get(view).ok_or(ServerError::BadViewToken(view.0))?;
        let paint = layer.paint();
        let rect = |r: RectF| layer.map_rect(r).to_pixels().offset_by(local.x, local.y);
        let point = |p: PointF| layer.map_point(p).round().offset_by(local.x, local.y);

        let engine = self.desktop.engine();
        match op {
            DrawOp::StrokeLine { from, to } => {
                let _access = engine.lock_parallel();
                engine.stroke_line(point(*from), point(*to), &paint, &clip);
            }
            DrawOp::StrokeRect(r) => {
                let _access = engine.lock_parallel();
                engine.stroke_rect(rect(*r), &paint, &clip);
            }
            DrawOp::FillRect(r) => {
                let _access = engine.lock_parallel();
                engine.fill_rect(rect(*r), &paint, &clip);
            }
            DrawOp::FillRegion(region) => {
                let mapped = region.map_rects(|r| rect(r.to_f32()));
                let _access = engine.lock_parallel();
                engine.fill_region(&mapped, &paint, &clip);
            }
            DrawOp::StrokeEllipse(r) => {
                let _access = engine.lock_parallel();
                engine.stroke_ellipse(rect(*r), &paint, &clip);
            }
            DrawOp::FillEllipse(r) => {
                let _access = engine.lock_parallel();
                engine.fill_ellipse(rect(*r), &paint, &clip);
            }
            DrawOp::DrawString { text, at } => {
                let fonts = &self.desktop.resources().fonts;
                let font = fonts.get(layer.state().font).unwrap_or_else(|| fonts.default_font());
                let size = font.size * layer.transform().1;
                let _access = engine.lock_parallel();
                engine.draw_string(text, point(*at), size, &paint, &clip);
            }
            DrawOp::DrawBitmap { token, source, dest } => {
                let bitmap = self
                    .desktop
                    .resources()
                    .bitmaps
                    .get(*token)
                    .ok_or(ServerError::BadToken(*token))?;
                let _access = engine.lock_parallel();
                engine.draw_bitmap(&bitmap, source.to_pixels(), rect(*dest), &clip);
            }
            DrawOp::DrawPicture { .. } => {}
        }
        Ok(())
    }

    /// Plays a recorded picture into `view` with its origin at `at`. The
    /// view's drawing state is the same afterwards.
    fn replay_picture(
        &self,
        window: &WindowLayer,
        view: ViewToken,
        token: u32,
        at: PointF,
        depth: usize,
    ) -> Result<(), ServerError> {
        if depth >= MAX_PICTURE_DEPTH {
            return Err(ServerError::BadValue("picture nesting too deep"));
        }
        let picture = self
            .desktop
            .resources()
            .pictures
            .get(token)
            .ok_or(ServerError::BadToken(token))?;
        let ops = picture.ops()?;

        let depth_before = {
            let mut views = window.views();
            let depth_before = views
                .get(view)
                .map(|v| v.state_depth())
                .ok_or(ServerError::BadViewToken(view.0))?;
            views.apply_state(view, &StateOp::PushState)?;
            views.apply_state(view, &StateOp::SetOrigin(at))?;
            depth_before
        };
        for op in &ops {
            let result = match op {
                PictureOp::State(state) => window.views().apply_state(view, state),
                PictureOp::Draw(draw) => self.draw(window, view, draw, depth + 1),
            };
            if let Err(err) = result {
                debug!("window {}: picture {} op {:?} failed: {}", self.id, token, op.opcode(), err);
            }
        }

        let mut views = window.views();
        while views.get(view).is_some_and(|v| v.state_depth() > depth_before) {
            views.apply_state(view, &StateOp::PopState)?;
        }
        Ok(())
    }

    fn direct_connect(&mut self) {
        if self.direct.is_some() {
            self.finish(Opcode::DirectConnect, Err(ServerError::NotAllowed("already directly connected")));
            return;
        }
        let resources = self.desktop.resources().clone();
        let timeout = self.desktop.config().server.direct_handoff_timeout();
        let session = match DirectWindowSession::connect(&resources, timeout) {
            Ok(session) => session,
            Err(err) => {
                self.finish(Opcode::DirectConnect, Err(err));
                return;
            }
        };

        // the client needs the ids before it can acknowledge the start hand-off
        let mut reply = protocol::reply(Status::Ok);
        reply.sync_data(session.sync_data());
        self.send(reply);

        let id = self.id;
        match self.desktop.write(|state| state.attach_direct(id, session.clone())) {
            Ok(()) => {
                info!("window {}: direct connection {} established", id, session.area_id());
                self.direct = Some(session);
                self.state = ConnectionState::DirectConnected;
            }
            Err(err) => {
                warn!("window {}: direct connection failed: {}", id, err);
                session.teardown();
                session.unregister(&resources);
            }
        }
    }

    fn direct_disconnect(&mut self) -> Result<(), ServerError> {
        let session = self.direct.take().ok_or(ServerError::NotConnected)?;
        let id = self.id;
        let stop = self.desktop.write(|state| {
            state.detach_direct(id);
            state
                .window(id)
                .map(|window| (window.frame(), state.screen_info()))
        });
        if let Some((frame, screen)) = stop {
            if session.is_connected() {
                if let Err(err) = session.handoff(BufferState::Stop, BufferFlags::empty(), frame, &Region::new(), screen) {
                    debug!("window {}: stop hand-off failed: {}", id, err);
                }
            }
        }
        session.teardown();
        session.unregister(self.desktop.resources());
        self.state = ConnectionState::Running;
        info!("window {}: direct connection {} closed", id, session.area_id());
        Ok(())
    }

    /// Drops a direct session the client let time out.
    fn check_direct(&mut self) {
        let Some(session) = self.direct.as_ref().filter(|s| !s.is_connected()).cloned() else {
            return;
        };
        warn!("window {}: direct connection {} lost", self.id, session.area_id());
        let id = self.id;
        self.desktop.write(|state| state.detach_direct(id));
        session.unregister(self.desktop.resources());
        self.direct = None;
        self.state = ConnectionState::Running;
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.state = ConnectionState::Closing;
        if let Some(session) = self.direct.take() {
            session.teardown();
            session.unregister(self.desktop.resources());
        }
        let id = self.id;
        self.desktop.write(|state| state.remove_window(id));
        self.desktop.remove_window_listeners(id);
        {
            let mut drag = self.desktop.drag().lock();
            if drag.is_some_and(|d| d.host == id) {
                *drag = None;
            }
        }
        info!("window {} closed", id);
    }
}

impl Drop for ServerWindow {
    /// Removes the window if its thread unwinds before `run` could.
    fn drop(&mut self) {
        if !self.closed {
            if std::thread::panicking() {
                warn!("window {}: connection thread panicked", self.id);
            }
            self.close();
        }
    }
}

#[cfg(test)]
mod tests;
