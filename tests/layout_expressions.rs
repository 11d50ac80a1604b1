use std::cell::Cell;
use std::rc::Rc;

use kurbo::Rect;
use reflow::layout::bind;
use reflow::{Axis, ConnectContext, LayoutEngine};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn free_context() -> ConnectContext {
    ConnectContext {
        owner: None,
        parent: None,
        axis: Axis::Horizontal,
    }
}

#[test]
fn arithmetic_precedence() {
    init_tracing();
    let engine = LayoutEngine::new();
    assert_eq!(engine.expression("10 + 2 * 3").unwrap().value(), 16.0);
    assert_eq!(engine.expression("(10 + 2) * 3").unwrap().value(), 36.0);
    assert_eq!(engine.expression("2 * 3 + 10").unwrap().value(), 16.0);
    assert_eq!(engine.expression("-4 + 1").unwrap().value(), -3.0);
}

#[test]
fn named_bindings_follow_their_source() {
    init_tracing();
    let engine = LayoutEngine::new();
    let sidebar = engine.register_source(Some("sidebar"));
    engine.set_source_rect(sidebar, Rect::new(0.0, 0.0, 200.0, 600.0));

    let left = engine.expression("&sidebar.right + 10").unwrap();
    left.connect(free_context());
    assert_eq!(left.value(), 210.0);

    engine.set_source_rect(sidebar, Rect::new(50.0, 0.0, 300.0, 600.0));
    assert_eq!(left.value(), 310.0);
}

#[test]
fn owner_and_parent_references_resolve_at_connect() {
    init_tracing();
    let engine = LayoutEngine::new();
    let parent = engine.register_source(None);
    let child = engine.register_source(None);
    engine.set_source_rect(parent, Rect::new(0.0, 0.0, 400.0, 300.0));
    engine.set_source_rect(child, Rect::new(10.0, 10.0, 110.0, 60.0));

    let centered = engine.expression("(parent.width - width) / 2").unwrap();
    centered.connect(ConnectContext {
        owner: Some(child),
        parent: Some(parent),
        axis: Axis::Horizontal,
    });
    assert_eq!(centered.value(), 150.0);
}

#[test]
fn percent_resolves_against_current_parent() {
    init_tracing();
    let engine = LayoutEngine::new();
    let wide = engine.register_source(None);
    let narrow = engine.register_source(None);
    engine.set_source_rect(wide, Rect::new(0.0, 0.0, 200.0, 100.0));
    engine.set_source_rect(narrow, Rect::new(0.0, 0.0, 50.0, 100.0));

    let half = engine.expression("50%").unwrap();
    half.connect(ConnectContext {
        owner: None,
        parent: Some(wide),
        axis: Axis::Horizontal,
    });
    assert_eq!(half.value(), 100.0);

    // Reparenting re-resolves the percent against the new span.
    half.connect(ConnectContext {
        owner: None,
        parent: Some(narrow),
        axis: Axis::Horizontal,
    });
    assert_eq!(half.value(), 25.0);
}

#[test]
fn callbacks_fire_exactly_once_per_change() {
    init_tracing();
    let engine = LayoutEngine::new();
    let panel = engine.register_source(Some("panel"));

    // A diamond: both operands depend on the same source, but one geometry
    // change must produce one notification.
    let expr = engine.expression("&panel.width + &panel.width / 2").unwrap();
    expr.connect(free_context());

    let fired = Rc::new(Cell::new(0));
    let counter = fired.clone();
    expr.on_change(move || counter.set(counter.get() + 1));

    engine.set_source_rect(panel, Rect::new(0.0, 0.0, 100.0, 50.0));
    assert_eq!(fired.get(), 1);
    assert_eq!(expr.value(), 150.0);

    // Reading repeatedly never re-fires.
    expr.value();
    expr.value();
    assert_eq!(fired.get(), 1);

    // Same rect, no change, no notification.
    engine.set_source_rect(panel, Rect::new(0.0, 0.0, 100.0, 50.0));
    assert_eq!(fired.get(), 1);

    // Moving without resizing leaves a width-only expression untouched.
    engine.set_source_rect(panel, Rect::new(30.0, 40.0, 130.0, 90.0));
    assert_eq!(fired.get(), 1);

    engine.set_source_rect(panel, Rect::new(30.0, 40.0, 230.0, 90.0));
    assert_eq!(fired.get(), 2);
    assert_eq!(expr.value(), 300.0);
}

#[test]
fn callback_can_reenter_the_engine() {
    init_tracing();
    let engine = LayoutEngine::new();
    let panel = engine.register_source(Some("panel"));
    let width = engine.expression("&panel.width").unwrap();
    width.connect(free_context());

    let seen = Rc::new(Cell::new(0.0));
    let inner = width.clone();
    let seen_in_cb = seen.clone();
    width.on_change(move || seen_in_cb.set(inner.value()));

    engine.set_source_rect(panel, Rect::new(0.0, 0.0, 77.0, 10.0));
    assert_eq!(seen.get(), 77.0);
}

#[test]
fn conditional_only_pulls_the_taken_branch() {
    init_tracing();
    let engine = LayoutEngine::new();
    let panel = engine.register_source(Some("panel"));
    engine.set_source_rect(panel, Rect::new(0.0, 0.0, 80.0, 20.0));

    let expr = engine
        .expression("if(&panel.width > 100, &panel.width, 100)")
        .unwrap();
    expr.connect(free_context());
    assert_eq!(expr.value(), 100.0);

    engine.set_source_rect(panel, Rect::new(0.0, 0.0, 250.0, 20.0));
    assert_eq!(expr.value(), 250.0);
}

#[test]
fn removed_source_keeps_last_value() {
    init_tracing();
    let engine = LayoutEngine::new();
    let panel = engine.register_source(Some("panel"));
    engine.set_source_rect(panel, Rect::new(0.0, 0.0, 120.0, 40.0));

    let width = engine.expression("&panel.width").unwrap();
    width.connect(free_context());
    assert_eq!(width.value(), 120.0);

    engine.remove_source(panel);
    assert_eq!(width.value(), 120.0);
}

#[test]
fn expression_strings_round_trip() {
    init_tracing();
    let engine = LayoutEngine::new();
    let panel = engine.register_source(Some("panel"));
    engine.set_source_rect(panel, Rect::new(0.0, 0.0, 200.0, 100.0));

    for src in [
        "10 + 2 * 3",
        "(10 + 2) * 3",
        "&panel.width / 2",
        "min(&panel.width, 150)",
        "clamp(&panel.width, 0, 120)",
        "if(&panel.width > 100, 1, 0)",
        "50% + 5",
        "parent.height - 4",
    ] {
        let first = engine.expression(src).unwrap();
        let rendered = first.to_expression_string();
        let second = engine.expression(&rendered).unwrap();
        let ctx = ConnectContext {
            owner: None,
            parent: Some(panel),
            axis: Axis::Horizontal,
        };
        first.connect(ctx);
        second.connect(ctx);
        assert_eq!(first.value(), second.value(), "{src} vs {rendered}");
    }
}

#[test]
fn handles_compose_with_operators() {
    init_tracing();
    let engine = LayoutEngine::new();
    let a = engine.register_source(None);
    let b = engine.register_source(None);
    engine.set_source_rect(a, Rect::new(0.0, 0.0, 30.0, 30.0));
    engine.set_source_rect(b, Rect::new(0.0, 0.0, 50.0, 50.0));

    let total = &bind::bind_width(&engine, a) + &bind::bind_width(&engine, b);
    let padded = &total + 8.0;
    assert_eq!(padded.value(), 88.0);

    // Extending a handle never disturbs the original.
    assert_eq!(total.value(), 80.0);

    engine.set_source_rect(a, Rect::new(0.0, 0.0, 40.0, 30.0));
    assert_eq!(padded.value(), 98.0);

    let capped = bind::bind_max(&total, &engine.constant(85.0));
    assert_eq!(capped.value(), 90.0);
    assert_eq!(bind::bind_range(&total, 0.0, 85.0).value(), 85.0);
}

#[test]
fn two_dimensional_layouts_split_axes() {
    init_tracing();
    let engine = LayoutEngine::new();
    let parent = engine.register_source(None);
    engine.set_source_rect(parent, Rect::new(0.0, 0.0, 400.0, 300.0));

    let size = engine.expression_pair("(50%, 25%)").unwrap();
    size.connect(None, Some(parent));
    assert_eq!(size.value(), kurbo::Point::new(200.0, 75.0));

    engine.set_source_rect(parent, Rect::new(0.0, 0.0, 100.0, 100.0));
    assert_eq!(size.value(), kurbo::Point::new(50.0, 25.0));
}

#[test]
fn unknown_names_warn_but_do_not_fail() {
    init_tracing();
    let engine = LayoutEngine::new();
    let expr = engine.expression("&ghost.width + 5").unwrap();
    expr.connect(free_context());
    // The dangling measurement holds its zero default.
    assert_eq!(expr.value(), 5.0);

    // Registering the name and reconnecting picks it up.
    let ghost = engine.register_source(Some("ghost"));
    engine.set_source_rect(ghost, Rect::new(0.0, 0.0, 20.0, 20.0));
    expr.connect(free_context());
    assert_eq!(expr.value(), 25.0);
}

#[test]
fn syntax_errors_are_reported_at_parse_time() {
    init_tracing();
    let engine = LayoutEngine::new();
    assert!(engine.expression("10 +").is_err());
    assert!(engine.expression("bogus(1)").is_err());
    assert!(engine.expression("&panel.").is_err());
    assert!(engine.expression("width ~ 2").is_err());
}

#[test]
fn dropping_a_clone_keeps_the_shared_node_alive() {
    init_tracing();
    let engine = LayoutEngine::new();
    let panel = engine.register_source(Some("panel"));
    engine.set_source_rect(panel, Rect::new(0.0, 0.0, 60.0, 60.0));

    let original = engine.expression("&panel.width * 2").unwrap();
    original.connect(free_context());
    let copy = original.clone();
    drop(original);
    assert_eq!(copy.value(), 120.0);

    engine.set_source_rect(panel, Rect::new(0.0, 0.0, 70.0, 60.0));
    assert_eq!(copy.value(), 140.0);
}
