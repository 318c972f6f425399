use std::cell::RefCell;
use std::rc::Rc;

use history_brush::io::decode_data_uri;
use history_brush::{
    BrushMode, BrushProperties, HistoryControl, MaskCallbacks, MaskRaster, MaskSession,
    SurfaceRect,
};

#[derive(Default)]
struct Events {
    masks: Vec<String>,
    can_undo: Option<bool>,
    can_redo: Option<bool>,
}

fn session(width: u32, height: u32) -> (MaskSession, Rc<RefCell<Events>>) {
    let events = Rc::new(RefCell::new(Events::default()));
    let (a, b, c) = (events.clone(), events.clone(), events.clone());
    let callbacks = MaskCallbacks {
        on_mask_change: Some(Box::new(move |uri| a.borrow_mut().masks.push(uri.to_string()))),
        on_undo_state_change: Some(Box::new(move |v| b.borrow_mut().can_undo = Some(v))),
        on_redo_state_change: Some(Box::new(move |v| c.borrow_mut().can_redo = Some(v))),
    };
    (MaskSession::new(width, height, Box::new(callbacks)), events)
}

fn stroke(session: &mut MaskSession, points: &[(f32, f32)]) {
    let (w, h) = session.raster().dimensions();
    let rect = Some(SurfaceRect::native(w, h));
    let Some((first, rest)) = points.split_first() else {
        return;
    };
    session.pointer_down(*first, rect);
    for p in rest {
        session.pointer_move(*p, rect);
    }
    session.pointer_up();
}

fn flags(events: &Rc<RefCell<Events>>) -> (Option<bool>, Option<bool>) {
    let e = events.borrow();
    (e.can_undo, e.can_redo)
}

#[test]
fn initialize_gives_black_opaque_raster() {
    let (session, events) = session(400, 300);
    assert_eq!(flags(&events), (Some(false), Some(false)));
    assert_eq!(session.raster().dimensions(), (400, 300));
    assert!(session.raster().is_blank());
}

#[test]
fn tap_then_undo_restores_blank() {
    let (mut session, events) = session(400, 300);
    session.set_brush(BrushProperties::new(50.0, 100.0, BrushMode::Paint));
    stroke(&mut session, &[(10.0, 10.0)]);

    assert_eq!(session.stroke_dabs(), 1);
    assert_eq!(session.history().undo_count(), 2);
    assert_eq!(flags(&events), (Some(true), Some(false)));
    assert_eq!(events.borrow().masks.len(), 1);
    assert_eq!(session.raster().get_pixel(10, 10).0, [255, 255, 255, 255]);

    assert!(session.undo());
    assert!(session.raster().is_blank());
    assert_eq!(flags(&events), (Some(false), Some(true)));
    assert_eq!(events.borrow().masks.len(), 2);
}

#[test]
fn exported_mask_matches_raster() {
    let (mut session, events) = session(64, 48);
    session.set_brush(BrushProperties::new(20.0, 30.0, BrushMode::Paint));
    stroke(&mut session, &[(5.0, 5.0), (40.0, 30.0)]);
    let uri = events.borrow().masks.last().cloned().expect("mask emitted");
    let decoded = decode_data_uri(&uri).expect("decodes");
    assert_eq!(&decoded, session.raster().image());
}

#[test]
fn n_undos_return_to_blank() {
    let (mut session, events) = session(120, 90);
    let n = 5;
    for i in 0..n {
        let y = 10.0 + i as f32 * 15.0;
        stroke(&mut session, &[(5.0, y), (100.0, y)]);
    }
    for i in 0..n {
        assert!(events.borrow().can_undo.unwrap_or(false));
        assert!(session.undo(), "undo {i} should apply");
    }
    assert!(session.raster().is_blank());
    assert_eq!(events.borrow().can_undo, Some(false));
    assert!(!session.undo());
}

#[test]
fn undo_then_redo_is_pixel_identical() {
    let (mut session, _events) = session(100, 100);
    session.set_brush(BrushProperties::new(30.0, 20.0, BrushMode::Paint));
    stroke(&mut session, &[(10.0, 10.0), (90.0, 90.0)]);
    session.set_brush(BrushProperties::new(15.0, 70.0, BrushMode::Erase));
    stroke(&mut session, &[(50.0, 10.0), (50.0, 90.0)]);
    session.set_brush(BrushProperties::new(60.0, 0.0, BrushMode::Paint));
    stroke(&mut session, &[(80.0, 20.0)]);

    let before: MaskRaster = session.raster().clone();
    for k in 1..=3 {
        for _ in 0..k {
            session.undo();
        }
        for _ in 0..k {
            assert!(session.redo());
        }
        assert_eq!(session.raster(), &before);
    }
}

#[test]
fn new_stroke_after_undo_discards_redo() {
    let (mut session, events) = session(100, 100);
    stroke(&mut session, &[(20.0, 20.0)]);
    stroke(&mut session, &[(60.0, 60.0)]);
    session.undo();
    assert_eq!(events.borrow().can_redo, Some(true));

    stroke(&mut session, &[(80.0, 20.0)]);
    assert_eq!(events.borrow().can_redo, Some(false));
    let snapshot = session.raster().clone();
    assert!(!session.redo());
    assert_eq!(session.raster(), &snapshot);
}

#[test]
fn erase_never_increases_alpha() {
    let (mut session, _events) = session(80, 80);
    session.set_brush(BrushProperties::new(60.0, 50.0, BrushMode::Paint));
    stroke(&mut session, &[(40.0, 40.0)]);
    let painted = session.raster().clone();

    session.set_brush(BrushProperties::new(40.0, 10.0, BrushMode::Erase));
    stroke(&mut session, &[(20.0, 40.0), (60.0, 40.0)]);
    let erased = session.raster();
    let mut reduced = false;
    for y in 0..80 {
        for x in 0..80 {
            let a0 = painted.get_pixel(x, y).0[3];
            let a1 = erased.get_pixel(x, y).0[3];
            assert!(a1 <= a0, "alpha rose at ({x},{y})");
            reduced |= a1 < a0;
        }
    }
    assert!(reduced);
}

#[test]
fn reset_clears_any_depth() {
    let (mut session, events) = session(50, 50);
    for i in 0..4 {
        stroke(&mut session, &[(5.0 + i as f32 * 10.0, 25.0)]);
    }
    session.undo();
    assert!(session.sync_host(50, 50, 7));
    assert_eq!(session.history().undo_count(), 1);
    assert_eq!(session.history().redo_count(), 0);
    assert_eq!(flags(&events), (Some(false), Some(false)));
    assert!(session.raster().is_blank());
}

#[test]
fn scaled_surface_maps_into_native_pixels() {
    let (mut session, _events) = session(200, 100);
    session.set_brush(BrushProperties::new(10.0, 100.0, BrushMode::Paint));
    // displayed at half size, offset by the page layout
    let rect = Some(SurfaceRect::new(30.0, 40.0, 100.0, 50.0));
    session.pointer_down((80.0, 65.0), rect);
    session.pointer_leave();
    assert_eq!(session.raster().get_pixel(100, 50).0, [255, 255, 255, 255]);
    assert_eq!(session.history().undo_count(), 2);
}
