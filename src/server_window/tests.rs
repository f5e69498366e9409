use super::*;
use crate::config::TesseraConfig;
use crate::direct::BufferState;
use crate::geometry::{Point, Rgba};
use crate::ipc;
use crate::protocol::events::ServerEvent;
use crate::protocol::SizeLimits;
use crate::renderer::{DrawKind, HeadlessEngine};
use crate::window::{WindowFeel, WindowFlags, WindowLook};
use std::thread;
use std::time::Duration;

const RED: Rgba = Rgba::new(255, 0, 0, 255);
const GREEN: Rgba = Rgba::new(0, 255, 0, 255);

fn desktop_with(config: TesseraConfig) -> (Arc<Desktop>, Arc<HeadlessEngine>) {
    let engine = Arc::new(HeadlessEngine::new(400, 300));
    let desktop = Desktop::new(1, Arc::new(config), engine.clone());
    (Arc::new(desktop), engine)
}

fn desktop() -> (Arc<Desktop>, Arc<HeadlessEngine>) {
    let mut config = TesseraConfig::default();
    config.screen.width = 400;
    config.screen.height = 300;
    desktop_with(config)
}

fn window_spec(frame: Rect) -> WindowSpec {
    WindowSpec {
        frame,
        look: WindowLook::NoBorder,
        feel: WindowFeel::Normal,
        flags: WindowFlags::empty(),
        workspaces: 0,
        title: "client".to_string(),
        team: 3,
    }
}

fn view_spec(token: u32, parent: u32, frame: Rect) -> ViewSpec {
    ViewSpec {
        token,
        parent,
        frame,
        event_mask: 0,
        hidden: false,
    }
}

fn connect(desktop: &Arc<Desktop>, frame: Rect) -> (ServerWindow, PortReceiver) {
    let (client, receiver) = ipc::port("client");
    let window = ServerWindow::new(desktop.clone(), &window_spec(frame), client).unwrap();
    (window, receiver)
}

/// A shown window with a root view covering its frame.
fn running(desktop: &Arc<Desktop>, frame: Rect) -> (ServerWindow, PortReceiver) {
    let (mut window, mut receiver) = connect(desktop, frame);
    send(
        &mut window,
        vec![
            Request::ShowWindow,
            Request::CreateRootView(view_spec(1, 0, Rect::from_size(0, 0, frame.width(), frame.height()))),
        ],
    );
    assert_eq!(status(&mut receiver), Status::Ok);
    (window, receiver)
}

fn send(window: &mut ServerWindow, requests: Vec<Request>) {
    window.process_batch(requests.iter().map(Request::to_message).collect());
}

/// Next reply, skipping events.
fn next_reply(receiver: &mut PortReceiver) -> Option<Message> {
    while let Ok(Some(message)) = receiver.try_recv() {
        if message.code == Opcode::Reply as u32 {
            return Some(message);
        }
    }
    None
}

fn status(receiver: &mut PortReceiver) -> Status {
    let reply = next_reply(receiver).expect("reply");
    Status::from_code(reply.reader().i32().unwrap())
}

fn clip_region(window: &mut ServerWindow, receiver: &mut PortReceiver) -> Region {
    send(window, vec![Request::GetClipRegion]);
    let reply = next_reply(receiver).expect("reply");
    let mut r = reply.reader();
    assert_eq!(r.i32().unwrap(), 0);
    r.region().unwrap()
}

fn fill(rect: RectF) -> Request {
    Request::Draw(DrawOp::FillRect(rect))
}

#[test]
fn test_child_view_before_root_is_rejected() {
    let (desktop, _engine) = desktop();
    let (mut window, mut receiver) = connect(&desktop, Rect::new(10, 10, 110, 110));

    send(&mut window, vec![Request::CreateView(view_spec(2, 1, Rect::new(0, 0, 10, 10)))]);
    assert_eq!(status(&mut receiver), Status::NotAllowed);
    assert_eq!(window.state(), ConnectionState::WaitingForRootView);

    send(&mut window, vec![Request::CreateRootView(view_spec(1, 0, Rect::new(0, 0, 100, 100)))]);
    assert_eq!(status(&mut receiver), Status::Ok);
    assert_eq!(window.state(), ConnectionState::Running);
    assert_eq!(window.current_view(), Some(ViewToken(1)));

    send(&mut window, vec![Request::CreateRootView(view_spec(9, 0, Rect::new(0, 0, 100, 100)))]);
    assert_eq!(status(&mut receiver), Status::NotAllowed);
}

#[test]
fn test_unknown_opcode_before_root_view_is_dropped() {
    let (desktop, _engine) = desktop();
    let (mut window, mut receiver) = connect(&desktop, Rect::new(10, 10, 110, 110));

    window.process_batch(vec![
        Message::new(0xBEEF, vec![]),
        Request::Sync.to_message(),
    ]);
    assert_eq!(status(&mut receiver), Status::Ok);
    assert!(next_reply(&mut receiver).is_none());
    assert_eq!(window.state(), ConnectionState::WaitingForRootView);
}

#[test]
fn test_malformed_request_gets_error_status() {
    let (desktop, _engine) = desktop();
    let (mut window, mut receiver) = connect(&desktop, Rect::new(10, 10, 110, 110));
    window.process_batch(vec![Message::new(Opcode::CreateRootView as u32, vec![1, 2])]);
    assert_eq!(status(&mut receiver), Status::BadValue);
    assert_eq!(window.state(), ConnectionState::WaitingForRootView);
}

#[test]
fn test_session_request_on_window_port() {
    let (desktop, _engine) = desktop();
    let (mut window, mut receiver) = connect(&desktop, Rect::new(10, 10, 110, 110));
    send(&mut window, vec![Request::CountWorkspaces]);
    assert_eq!(status(&mut receiver), Status::NotAllowed);
}

#[test]
fn test_drawing_before_root_view_is_dropped() {
    let (desktop, engine) = desktop();
    let (mut window, mut receiver) = connect(&desktop, Rect::new(10, 10, 110, 110));
    send(&mut window, vec![Request::ShowWindow]);
    engine.take_records();

    send(&mut window, vec![fill(RectF::new(0.0, 0.0, 50.0, 50.0))]);
    assert!(engine.records().is_empty());
    assert!(next_reply(&mut receiver).is_none());
}

#[test]
fn test_fill_rect_lands_in_window_coordinates() {
    let (desktop, engine) = desktop();
    let (mut window, _receiver) = running(&desktop, Rect::new(10, 10, 110, 110));
    engine.take_records();

    send(
        &mut window,
        vec![
            Request::State(StateOp::SetHighColor(RED)),
            fill(RectF::new(0.0, 0.0, 20.0, 20.0)),
            // clipped by the window frame
            fill(RectF::new(90.0, 90.0, 200.0, 200.0)),
        ],
    );
    let expected = Region::from_rects([Rect::new(10, 10, 30, 30), Rect::new(100, 100, 110, 110)]);
    assert_eq!(engine.touched_with(RED), expected);
}

#[test]
fn test_origin_and_scale_transform_drawing() {
    let (desktop, engine) = desktop();
    let (mut window, _receiver) = running(&desktop, Rect::new(0, 0, 200, 200));
    engine.take_records();

    send(
        &mut window,
        vec![
            Request::State(StateOp::SetHighColor(RED)),
            Request::State(StateOp::SetOrigin(PointF::new(10.0, 20.0))),
            Request::State(StateOp::SetScale(2.0)),
            fill(RectF::new(0.0, 0.0, 5.0, 5.0)),
            Request::State(StateOp::PushState),
            Request::State(StateOp::SetHighColor(GREEN)),
            Request::State(StateOp::SetOrigin(PointF::new(5.0, 0.0))),
            fill(RectF::new(0.0, 0.0, 5.0, 5.0)),
            Request::State(StateOp::PopState),
        ],
    );
    assert_eq!(engine.touched_with(RED), Region::from_rect(Rect::new(10, 20, 20, 30)));
    assert_eq!(engine.touched_with(GREEN), Region::from_rect(Rect::new(20, 20, 30, 30)));
}

#[test]
fn test_hidden_window_drops_drawing() {
    let (desktop, engine) = desktop();
    let (mut window, _receiver) = running(&desktop, Rect::new(10, 10, 110, 110));
    send(&mut window, vec![Request::HideWindow]);
    engine.take_records();

    send(&mut window, vec![fill(RectF::new(0.0, 0.0, 50.0, 50.0))]);
    assert!(engine.records().is_empty());
}

#[test]
fn test_child_view_claims_its_area() {
    let (desktop, engine) = desktop();
    let (mut window, mut receiver) = running(&desktop, Rect::new(0, 0, 100, 100));
    send(&mut window, vec![Request::CreateView(view_spec(2, 1, Rect::new(0, 0, 50, 100)))]);
    assert_eq!(status(&mut receiver), Status::Ok);
    engine.take_records();

    send(
        &mut window,
        vec![
            Request::State(StateOp::SetHighColor(RED)),
            fill(RectF::new(0.0, 0.0, 100.0, 100.0)),
            Request::SetCurrentView { token: 2 },
            Request::State(StateOp::SetHighColor(GREEN)),
            fill(RectF::new(0.0, 0.0, 100.0, 100.0)),
        ],
    );
    assert_eq!(engine.touched_with(RED), Region::from_rect(Rect::new(50, 0, 100, 100)));
    assert_eq!(engine.touched_with(GREEN), Region::from_rect(Rect::new(0, 0, 50, 100)));
    assert_eq!(
        clip_region(&mut window, &mut receiver),
        Region::from_rect(Rect::new(0, 0, 50, 100))
    );
}

#[test]
fn test_deleting_current_view_falls_back_to_root() {
    let (desktop, _engine) = desktop();
    let (mut window, mut receiver) = running(&desktop, Rect::new(0, 0, 100, 100));
    send(
        &mut window,
        vec![
            Request::CreateView(view_spec(2, 1, Rect::new(0, 0, 50, 50))),
            Request::CreateView(view_spec(3, 2, Rect::new(0, 0, 10, 10))),
            Request::SetCurrentView { token: 3 },
            Request::DeleteView { token: 2 },
        ],
    );
    assert_eq!(status(&mut receiver), Status::Ok);
    assert_eq!(status(&mut receiver), Status::Ok);
    assert_eq!(window.current_view(), Some(ViewToken(1)));

    send(&mut window, vec![Request::SetCurrentView { token: 3 }, Request::Sync]);
    assert_eq!(status(&mut receiver), Status::Ok);
    assert_eq!(window.current_view(), Some(ViewToken(1)));
}

#[test]
fn test_overlapping_windows_clip_regions() {
    let (desktop, _engine) = desktop();
    let (mut a, mut a_receiver) = running(&desktop, Rect::new(0, 0, 100, 100));
    let (mut b, mut b_receiver) = running(&desktop, Rect::new(50, 50, 150, 150));

    let a_clip = clip_region(&mut a, &mut a_receiver);
    let expected = Region::from_rect(Rect::new(0, 0, 100, 100)).subtract_rect(Rect::new(50, 50, 100, 100));
    assert_eq!(a_clip, expected);
    assert!(a_clip.count() <= 3);
    assert_eq!(
        clip_region(&mut b, &mut b_receiver),
        Region::from_rect(Rect::new(0, 0, 100, 100))
    );
}

#[test]
fn test_user_clip_is_idempotent() {
    let (desktop, _engine) = desktop();
    let (mut window, mut receiver) = running(&desktop, Rect::new(0, 0, 100, 100));
    let clip = Region::from_rects([Rect::new(0, 0, 30, 30), Rect::new(60, 60, 90, 90)]);

    send(&mut window, vec![Request::SetUserClip { clip: clip.clone() }]);
    let once = clip_region(&mut window, &mut receiver);
    send(&mut window, vec![Request::SetUserClip { clip: clip.clone() }]);
    let twice = clip_region(&mut window, &mut receiver);
    assert_eq!(once, clip);
    assert_eq!(once, twice);

    send(&mut window, vec![Request::GetUserClip]);
    let reply = next_reply(&mut receiver).unwrap();
    let mut r = reply.reader();
    assert_eq!(r.i32().unwrap(), 0);
    assert_eq!(r.region().unwrap(), clip);

    send(&mut window, vec![Request::ClearUserClip]);
    assert_eq!(
        clip_region(&mut window, &mut receiver),
        Region::from_rect(Rect::new(0, 0, 100, 100))
    );
}

#[test]
fn test_user_clip_defaults_to_view_bounds() {
    let (desktop, _engine) = desktop();
    let (mut window, mut receiver) = running(&desktop, Rect::new(0, 0, 100, 80));
    send(
        &mut window,
        vec![Request::ScrollViewTo { to: Point::new(5, 7) }, Request::GetUserClip],
    );
    let reply = next_reply(&mut receiver).unwrap();
    let mut r = reply.reader();
    assert_eq!(r.i32().unwrap(), 0);
    assert_eq!(r.region().unwrap(), Region::from_rect(Rect::new(5, 7, 105, 87)));
}

#[test]
fn test_size_limits_round_trip() {
    let (desktop, _engine) = desktop();
    let (mut window, mut receiver) = running(&desktop, Rect::new(0, 0, 100, 100));
    let limits = SizeLimits {
        min_width: 50.0,
        max_width: 120.0,
        min_height: 40.0,
        max_height: 60.0,
    };
    send(&mut window, vec![Request::SetSizeLimits(limits)]);
    let reply = next_reply(&mut receiver).unwrap();
    let mut r = reply.reader();
    assert_eq!(r.i32().unwrap(), 0);
    assert_eq!(r.rect().unwrap(), Rect::new(0, 0, 100, 60));
    assert_eq!(r.f32().unwrap(), 50.0);
    assert_eq!(r.f32().unwrap(), 120.0);

    send(
        &mut window,
        vec![Request::ResizeWindowTo { width: 500, height: 10 }, Request::GetWindowFrame],
    );
    let reply = next_reply(&mut receiver).unwrap();
    let mut r = reply.reader();
    assert_eq!(r.i32().unwrap(), 0);
    assert_eq!(r.rect().unwrap(), Rect::new(0, 0, 120, 40));
}

#[test]
fn test_move_posts_event_and_updates_frame() {
    let (desktop, _engine) = desktop();
    let (mut window, mut receiver) = running(&desktop, Rect::new(0, 0, 100, 100));
    send(&mut window, vec![Request::MoveWindowTo { to: Point::new(30, 40) }]);

    let mut moved = false;
    while let Ok(Some(message)) = receiver.try_recv() {
        if let Ok(Some(ServerEvent::WindowMoved { to })) = ServerEvent::from_message(&message) {
            moved = to == Point::new(30, 40);
        }
    }
    assert!(moved);
    assert_eq!(
        desktop.read().window(window.id()).unwrap().frame(),
        Rect::new(30, 40, 130, 140)
    );
}

#[test]
fn test_invalidate_requests_update() {
    let (desktop, _engine) = desktop();
    let (mut window, mut receiver) = running(&desktop, Rect::new(20, 20, 120, 120));
    while receiver.try_recv().ok().flatten().is_some() {}

    send(&mut window, vec![Request::Invalidate { rect: Rect::new(10, 10, 30, 30) }]);
    let message = receiver.try_recv().unwrap().unwrap();
    assert_eq!(
        ServerEvent::from_message(&message).unwrap(),
        Some(ServerEvent::Update {
            region: Region::from_rect(Rect::new(10, 10, 30, 30))
        })
    );
}

#[test]
fn test_picture_records_then_replays() {
    let (desktop, engine) = desktop();
    let (mut window, mut receiver) = running(&desktop, Rect::new(0, 0, 200, 200));
    engine.take_records();

    send(
        &mut window,
        vec![
            Request::BeginPicture,
            Request::State(StateOp::SetHighColor(RED)),
            fill(RectF::new(0.0, 0.0, 10.0, 10.0)),
            Request::EndPicture,
        ],
    );
    assert!(engine.records().is_empty());
    let reply = next_reply(&mut receiver).unwrap();
    let mut r = reply.reader();
    assert_eq!(r.i32().unwrap(), 0);
    let token = r.u32().unwrap();

    send(
        &mut window,
        vec![
            Request::Draw(DrawOp::DrawPicture {
                token,
                at: PointF::new(50.0, 60.0),
            }),
            Request::Draw(DrawOp::DrawPicture {
                token,
                at: PointF::new(0.0, 0.0),
            }),
        ],
    );
    assert_eq!(
        engine.touched_with(RED),
        Region::from_rects([Rect::new(50, 60, 60, 70), Rect::new(0, 0, 10, 10)])
    );
    // replay leaves the view's own state alone
    let root = desktop.read().window(window.id()).unwrap().views().get(ViewToken(1)).unwrap().clone();
    assert_eq!(root.state_depth(), 1);
    assert_eq!(root.state().high_color, Rgba::BLACK);
}

#[test]
fn test_append_and_delete_picture() {
    let (desktop, engine) = desktop();
    let (mut window, mut receiver) = running(&desktop, Rect::new(0, 0, 200, 200));

    send(
        &mut window,
        vec![Request::BeginPicture, fill(RectF::new(0.0, 0.0, 10.0, 10.0)), Request::EndPicture],
    );
    let token = {
        let reply = next_reply(&mut receiver).unwrap();
        let mut r = reply.reader();
        r.i32().unwrap();
        r.u32().unwrap()
    };
    send(
        &mut window,
        vec![
            Request::AppendToPicture { token },
            fill(RectF::new(20.0, 0.0, 30.0, 10.0)),
            Request::EndPicture,
        ],
    );
    let reply = next_reply(&mut receiver).unwrap();
    let mut r = reply.reader();
    assert_eq!(r.i32().unwrap(), 0);
    assert_eq!(r.u32().unwrap(), token);
    assert_eq!(desktop.resources().pictures.get(token).unwrap().len(), 2);

    engine.take_records();
    send(
        &mut window,
        vec![
            Request::DeletePicture { token },
            Request::Draw(DrawOp::DrawPicture {
                token,
                at: PointF::new(0.0, 0.0),
            }),
        ],
    );
    assert!(desktop.resources().pictures.get(token).is_none());
    assert!(engine.records().is_empty());
}

#[test]
fn test_end_picture_without_begin() {
    let (desktop, _engine) = desktop();
    let (mut window, mut receiver) = running(&desktop, Rect::new(0, 0, 100, 100));
    send(&mut window, vec![Request::EndPicture]);
    assert_eq!(status(&mut receiver), Status::NotAllowed);
}

#[test]
fn test_draw_string_uses_font_size() {
    let (desktop, engine) = desktop();
    let (mut window, _receiver) = running(&desktop, Rect::new(0, 0, 200, 200));
    engine.take_records();
    send(
        &mut window,
        vec![Request::Draw(DrawOp::DrawString {
            text: "hello".to_string(),
            at: PointF::new(10.0, 20.0),
        })],
    );
    let records = engine.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, DrawKind::String);
}

#[test]
fn test_workspaces_view_is_drawn_by_the_server() {
    let (desktop, engine) = desktop();
    let (mut window, mut receiver) = running(&desktop, Rect::new(0, 0, 200, 200));
    engine.take_records();

    send(
        &mut window,
        vec![Request::CreateWorkspacesView(view_spec(5, 1, Rect::new(0, 0, 100, 100)))],
    );
    assert_eq!(status(&mut receiver), Status::Ok);
    let records = engine.records();
    assert!(!records.is_empty());
    for record in records {
        assert!(Rect::new(0, 0, 100, 100).contains_rect(&record.touched.bounds()));
    }
}

#[test]
fn test_direct_connect_handshake() {
    let (desktop, _engine) = desktop();
    let (mut window, mut receiver) = running(&desktop, Rect::new(0, 0, 100, 100));
    let resources = desktop.resources().clone();

    let client = thread::spawn(move || {
        let reply = loop {
            let message = receiver.recv().unwrap();
            if message.code == Opcode::Reply as u32 {
                break message;
            }
        };
        let mut r = reply.reader();
        assert_eq!(r.i32().unwrap(), 0);
        let sync = r.sync_data().unwrap();
        let notify = resources.semaphore(sync.acquire_sem).unwrap();
        assert!(notify.acquire_timeout(Duration::from_secs(2)));
        let (info, clip) = resources.direct_session(sync.area_id).unwrap().read_info();
        resources.semaphore(sync.release_sem).unwrap().release();
        (info.state(), clip, receiver)
    });

    send(&mut window, vec![Request::DirectConnect]);
    let (state, clip, _receiver) = client.join().unwrap();
    assert_eq!(state, Some(BufferState::Start));
    assert_eq!(clip, vec![Rect::new(0, 0, 100, 100)]);
    assert_eq!(window.state(), ConnectionState::DirectConnected);
}

#[test]
fn test_unacknowledged_direct_session_falls_back() {
    let mut config = TesseraConfig::default();
    config.screen.width = 400;
    config.screen.height = 300;
    config.server.direct_handoff_timeout_ms = 20;
    let (desktop, _engine) = desktop_with(config);
    let (mut window, mut receiver) = running(&desktop, Rect::new(0, 0, 100, 100));

    send(&mut window, vec![Request::DirectConnect]);
    let reply = next_reply(&mut receiver).unwrap();
    let mut r = reply.reader();
    assert_eq!(r.i32().unwrap(), 0);
    let sync = r.sync_data().unwrap();
    assert_eq!(window.state(), ConnectionState::DirectConnected);

    // the next batch notices the dead session
    send(&mut window, vec![Request::Sync]);
    assert_eq!(status(&mut receiver), Status::Ok);
    assert_eq!(window.state(), ConnectionState::Running);
    assert!(desktop.resources().direct_session(sync.area_id).is_none());
    assert!(desktop.read().window(window.id()).unwrap().direct().is_none());

    // disconnecting again is a silent no-op
    send(&mut window, vec![Request::DirectDisconnect, Request::Sync]);
    assert_eq!(status(&mut receiver), Status::Ok);
    assert!(next_reply(&mut receiver).is_none());
}

#[test]
fn test_quit_removes_window() {
    let (desktop, _engine) = desktop();
    let (window, _receiver) = connect(&desktop, Rect::new(0, 0, 100, 100));
    let id = window.id();
    let (server_port, server_receiver) = ipc::port("window");
    let handle = thread::spawn(move || window.run(server_receiver));

    server_port.send(Request::ShowWindow.to_message()).unwrap();
    server_port.send(Request::QuitWindow.to_message()).unwrap();
    handle.join().unwrap();
    assert!(desktop.read().window(id).is_none());
}

#[test]
fn test_port_loss_closes_window() {
    let (desktop, _engine) = desktop();
    let (window, _receiver) = connect(&desktop, Rect::new(0, 0, 100, 100));
    let id = window.id();
    desktop.add_listener(id, ViewToken(1), EventMask::POINTER);
    let (server_port, server_receiver) = ipc::port("window");
    let handle = thread::spawn(move || window.run(server_receiver));

    server_port.send(Request::ShowWindow.to_message()).unwrap();
    drop(server_port);
    handle.join().unwrap();
    assert!(desktop.read().window(id).is_none());
    assert!(desktop.listeners(EventMask::all()).is_empty());
}

#[test]
fn test_extreme_geometry_is_contained() {
    let (desktop, engine) = desktop();
    let (mut window, mut receiver) = running(&desktop, Rect::new(50, 50, 150, 150));
    engine.take_records();

    send(
        &mut window,
        vec![
            Request::MoveWindowBy { dx: i32::MAX, dy: 0 },
            Request::MoveWindowBy { dx: 0, dy: i32::MIN },
            Request::GetWindowFrame,
        ],
    );
    let reply = next_reply(&mut receiver).unwrap();
    let mut r = reply.reader();
    assert_eq!(r.i32().unwrap(), 0);
    assert_eq!(r.rect().unwrap(), Rect::new(50, 50, 150, 150));

    send(
        &mut window,
        vec![
            Request::State(StateOp::SetHighColor(RED)),
            fill(RectF::new(0.0, 0.0, 1e10, 1e10)),
            Request::Draw(DrawOp::StrokeLine {
                from: PointF::new(-1e12, 0.0),
                to: PointF::new(1e12, f32::MAX),
            }),
            Request::Invalidate { rect: Rect::new(0, 0, i32::MAX, i32::MAX) },
            Request::Sync,
        ],
    );
    assert_eq!(status(&mut receiver), Status::Ok);
    assert_eq!(engine.touched_with(RED), Region::from_rect(Rect::new(50, 50, 150, 150)));

    send(&mut window, vec![Request::ResizeWindowBy { dx: i32::MAX, dy: i32::MAX }, Request::Sync]);
    assert_eq!(status(&mut receiver), Status::Ok);
    let frame = desktop.read().window(window.id()).unwrap().frame();
    assert_eq!(frame.left_top(), Point::new(50, 50));
    assert!(frame.width() <= crate::window::MAX_DIMENSION as i32);
    assert_eq!(window.state(), ConnectionState::Running);
}

#[test]
fn test_panicking_connection_thread_removes_window() {
    let (desktop, _engine) = desktop();
    let (window, _receiver) = connect(&desktop, Rect::new(0, 0, 100, 100));
    let id = window.id();
    desktop.add_listener(id, ViewToken(1), EventMask::POINTER);

    let observer = desktop.clone();
    let handle = thread::spawn(move || {
        let mut window = window;
        send(&mut window, vec![Request::ShowWindow]);
        assert_eq!(observer.read().window_at(Point::new(50, 50)), Some(id));
        panic!("connection thread died mid-batch");
    });
    assert!(handle.join().is_err());

    assert!(desktop.read().window(id).is_none());
    assert_eq!(desktop.read().window_at(Point::new(50, 50)), None);
    assert!(desktop.listeners(EventMask::all()).is_empty());
}

#[test]
fn test_malformed_request_is_answered_in_turn() {
    let (desktop, _engine) = desktop();
    let (mut window, mut receiver) = running(&desktop, Rect::new(10, 10, 110, 110));

    let mut truncated = Request::SetSizeLimits(SizeLimits::UNLIMITED).to_message();
    truncated.data.truncate(6);
    window.process_batch(vec![Request::GetWindowFrame.to_message(), truncated]);

    let first = next_reply(&mut receiver).unwrap();
    assert_eq!(Status::from_code(first.reader().i32().unwrap()), Status::Ok);
    assert_eq!(first.data.len(), 22);
    assert_eq!(status(&mut receiver), Status::BadValue);
    assert!(next_reply(&mut receiver).is_none());
}

#[test]
fn test_decoding_sees_state_left_by_earlier_requests() {
    let (desktop, _engine) = desktop();
    let (mut window, mut receiver) = connect(&desktop, Rect::new(10, 10, 110, 110));

    window.process_batch(vec![
        Request::CreateRootView(view_spec(1, 0, Rect::new(0, 0, 100, 100))).to_message(),
        Message::new(Opcode::CreateView as u32, vec![1, 2]),
        Request::Sync.to_message(),
    ]);
    assert_eq!(status(&mut receiver), Status::Ok);
    assert_eq!(status(&mut receiver), Status::BadValue);
    assert_eq!(status(&mut receiver), Status::Ok);
    assert_eq!(window.state(), ConnectionState::Running);
}

#[test]
fn test_lost_client_port_closes_connection() {
    let (desktop, _engine) = desktop();
    let (mut window, receiver) = running(&desktop, Rect::new(0, 0, 100, 100));
    let id = window.id();
    drop(receiver);

    send(&mut window, vec![Request::Sync, Request::GetWindowFrame]);
    assert_eq!(window.state(), ConnectionState::Closing);

    let (_server_port, server_receiver) = ipc::port("window");
    thread::spawn(move || window.run(server_receiver)).join().unwrap();
    assert!(desktop.read().window(id).is_none());
}

#[test]
fn test_lost_client_port_noticed_without_replies() {
    let (desktop, _engine) = desktop();
    let (mut window, receiver) = running(&desktop, Rect::new(0, 0, 100, 100));
    drop(receiver);

    // moves only post events, which fail quietly
    send(&mut window, vec![Request::MoveWindowBy { dx: 5, dy: 5 }]);
    assert_eq!(window.state(), ConnectionState::Closing);
}
