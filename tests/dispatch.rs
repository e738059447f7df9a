//! End-to-end dispatch behaviour through the public API.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dissection::engine::heuristic::HeuristicOptions;
use dissection::engine::{MAX_DISSECT_DEPTH, constants};
use dissection::{
    ByteView, Context, DispatchConfig, DispatchEngine, DissectMode, DissectResult, DissectStatus,
    Dissector, Handler, HandlerResult, Key, ProtocolId, RegistrationError, RegistryBuilder,
};

fn consume(n: usize) -> impl Fn(&ByteView, &mut Context<'_>) -> HandlerResult + Send + Sync {
    move |_, _| Ok(DissectResult::Consumed(n))
}

fn reject() -> impl Fn(&ByteView, &mut Context<'_>) -> HandlerResult + Send + Sync {
    |_, _| Ok(DissectResult::Rejected)
}

#[test]
fn demo_table_exact_match_and_default() {
    let mut builder = RegistryBuilder::new();
    let h1 = builder.register_protocol("demo", "Demo protocol").expect("protocol");
    let table = builder.register_table("demo.type", "Demo type").expect("table");
    builder
        .register_handler(table, Key::UInt(1), Handler::new(h1, consume(4)))
        .expect("bind");
    let engine = DispatchEngine::new(builder.freeze().expect("freeze"));

    let buffer = [0xabu8; 10];
    let outcome = engine.dissect("demo.type", Key::UInt(1), &buffer, buffer.len());
    assert_eq!(outcome.status, DissectStatus::Ok(4));
    assert_eq!(outcome.protocol_counts.get(&h1), Some(&1));

    let outcome = engine.dissect("demo.type", Key::UInt(2), &buffer, buffer.len());
    assert_eq!(outcome.status, DissectStatus::Ok(10));
    assert_eq!(outcome.protocol_counts.get(&h1), None);
}

#[test]
fn heuristic_selection_is_deterministic_and_ordered() {
    let build = || {
        let mut builder = RegistryBuilder::new();
        let first = builder.register_protocol("first", "First").expect("first");
        let second = builder.register_protocol("second", "Second").expect("second");
        let urgent = builder.register_protocol("urgent", "Urgent").expect("urgent");
        let shy = builder.register_protocol("shy", "Shy").expect("shy");

        builder.register_heuristic("probe", Handler::new(shy, reject())).expect("shy");
        builder.register_heuristic("probe", Handler::new(first, consume(1))).expect("first");
        builder.register_heuristic("probe", Handler::new(second, consume(2))).expect("second");
        builder
            .register_heuristic_with(
                "probe",
                Handler::new(urgent, consume(3)),
                HeuristicOptions {
                    priority: 5,
                    enabled: false,
                },
            )
            .expect("urgent");
        (DispatchEngine::new(builder.freeze().expect("freeze")), first, urgent)
    };

    let (engine, first, urgent) = build();
    let (again, _, _) = build();
    let buffer = [1u8, 2, 3, 4];

    let a = engine.dissect("probe", 0u32, &buffer, buffer.len());
    let b = again.dissect("probe", 0u32, &buffer, buffer.len());
    assert_eq!(a.status, DissectStatus::Ok(1));
    assert_eq!(a.layers, vec![first]);
    assert_eq!(a.protocol_counts, b.protocol_counts);

    engine
        .registry()
        .set_heuristic_enabled("probe", urgent, true)
        .expect("enable");
    let c = engine.dissect("probe", 0u32, &buffer, buffer.len());
    assert_eq!(c.status, DissectStatus::Ok(3));
    assert_eq!(c.layers, vec![urgent]);
}

#[test]
fn duplicate_registration_has_no_effect() {
    let mut builder = RegistryBuilder::new();
    let original = builder.register_protocol("original", "Original").expect("original");
    let usurper = builder.register_protocol("usurper", "Usurper").expect("usurper");
    let table = builder.register_table("udp.port", "UDP port").expect("table");

    builder
        .register_handler(table, 53u16, Handler::new(original, consume(2)))
        .expect("first");
    let err = builder
        .register_handler(table, 53u16, Handler::new(usurper, consume(7)))
        .expect_err("duplicate");
    assert_eq!(
        err.to_string(),
        "key 53 is already registered in dissector table \"udp.port\""
    );
    assert!(matches!(
        builder.register_table("udp.port", "again"),
        Err(RegistrationError::DuplicateTable { .. })
    ));

    let engine = DispatchEngine::new(builder.freeze().expect("freeze"));
    let outcome = engine.dissect("udp.port", 53u16, &[0u8; 9], 9);
    assert_eq!(outcome.status, DissectStatus::Ok(2));
    assert_eq!(outcome.layers, vec![original]);
}

fn cyclic_engine(max_depth: u32) -> (DispatchEngine, ProtocolId, ProtocolId) {
    let mut builder = RegistryBuilder::new();
    let ping = builder.register_protocol("ping", "Ping").expect("ping");
    let pong = builder.register_protocol("pong", "Pong").expect("pong");
    builder.register_table("ping.next", "Ping next").expect("ping table");
    builder.register_table("pong.next", "Pong next").expect("pong table");

    builder
        .register_handler_by_name(
            "ping.next",
            0u32,
            Handler::new(ping, |view, ctx| {
                let consumed = ctx.dispatch("pong.next", 0u32, view)?;
                Ok(DissectResult::Consumed(consumed))
            }),
        )
        .expect("ping");
    builder
        .register_handler_by_name(
            "pong.next",
            0u32,
            Handler::new(pong, |view, ctx| {
                let consumed = ctx.dispatch("ping.next", 0u32, view)?;
                Ok(DissectResult::Consumed(consumed))
            }),
        )
        .expect("pong");

    let config = DispatchConfig {
        max_depth,
        ..DispatchConfig::default()
    };
    (
        DispatchEngine::with_config(builder.freeze().expect("freeze"), config),
        ping,
        pong,
    )
}

#[test]
fn handler_cycle_stops_at_depth_limit() {
    let (engine, ping, pong) = cyclic_engine(64);
    let buffer = [0u8; 12];

    let outcome = engine.dissect("ping.next", 0u32, &buffer, buffer.len());
    assert_eq!(outcome.status, DissectStatus::RecursionLimitExceeded);
    assert_eq!(outcome.consumed, buffer.len());
    assert_eq!(outcome.protocol_count(ping) + outcome.protocol_count(pong), 64);
    assert_eq!(outcome.malformed.len(), 1);
}

#[test]
fn handler_cycle_stops_at_default_ceiling() {
    let (engine, ping, pong) = cyclic_engine(MAX_DISSECT_DEPTH);
    let outcome = engine.dissect("ping.next", 0u32, &[1, 2, 3], 3);
    assert_eq!(outcome.status, DissectStatus::RecursionLimitExceeded);
    assert_eq!(
        outcome.protocol_count(ping) + outcome.protocol_count(pong),
        u64::from(MAX_DISSECT_DEPTH)
    );
}

#[test]
fn handler_cycle_on_spawned_worker_hits_ceiling_not_stack() {
    let worker = std::thread::spawn(|| {
        let (engine, ping, pong) = cyclic_engine(MAX_DISSECT_DEPTH);
        let outcome = engine.count("ping.next", 0u32, &[1, 2, 3], 3);
        (
            outcome.status.clone(),
            outcome.protocol_count(ping) + outcome.protocol_count(pong),
        )
    });

    let (status, invocations) = worker.join().expect("worker should not overflow");
    assert_eq!(status, DissectStatus::RecursionLimitExceeded);
    assert_eq!(invocations, u64::from(MAX_DISSECT_DEPTH));
}

#[test]
fn recursion_limit_keeps_later_packets_working() {
    let (engine, _, _) = cyclic_engine(16);
    let limited = engine.dissect("ping.next", 0u32, &[0u8; 4], 4);
    assert_eq!(limited.status, DissectStatus::RecursionLimitExceeded);

    let fine = engine.dissect("unrelated", 0u32, &[0u8; 4], 4);
    assert_eq!(fine.status, DissectStatus::Ok(4));
}

#[test]
fn repeated_dissection_yields_identical_counts() {
    let engine = DispatchEngine::from_modules(
        &[&dissection::BuiltinProtocols],
        DispatchConfig {
            mode: DissectMode::Count,
            ..DispatchConfig::default()
        },
    )
    .expect("builtins");

    let mut frame = vec![0u8; 12];
    frame.extend_from_slice(&[0x08, 0x06]);
    frame.extend_from_slice(&[0u8; 28]);

    let first = engine.dissect(constants::table::WTAP_ENCAP, constants::link_type::ETHERNET, &frame, frame.len());
    let second = engine.dissect(constants::table::WTAP_ENCAP, constants::link_type::ETHERNET, &frame, frame.len());
    assert_eq!(first.protocol_counts, second.protocol_counts);
    assert!(first.tree.is_none());
}

#[test]
fn engine_is_shared_across_workers() {
    let mut builder = RegistryBuilder::new();
    let seen = Arc::new(AtomicUsize::new(0));
    let proto = builder.register_protocol("shared", "Shared").expect("protocol");
    let table = builder.register_table("root", "Root").expect("table");
    let counter = Arc::clone(&seen);
    builder
        .register_handler(
            table,
            0u32,
            Handler::new(proto, move |view, _| {
                counter.fetch_add(1, Ordering::Relaxed);
                Ok(DissectResult::Consumed(view.remaining_captured()))
            }),
        )
        .expect("bind");
    let engine = Arc::new(DispatchEngine::new(builder.freeze().expect("freeze")));

    let totals: Vec<_> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..4)
            .map(|worker| {
                let engine = Arc::clone(&engine);
                scope.spawn(move || {
                    let frames: Vec<Vec<u8>> = (0..25).map(|n| vec![worker as u8; n + 1]).collect();
                    engine.count_frames("root", 0u32, frames.iter().map(Vec::as_slice))
                })
            })
            .collect();
        workers
            .into_iter()
            .map(|handle| handle.join().expect("worker"))
            .collect()
    });

    let mut session = dissection::SessionCounters::new();
    for total in &totals {
        session.merge(total);
    }
    assert_eq!(session.packets(), 100);
    assert_eq!(session.packets_with(proto), 100);
    assert_eq!(seen.load(Ordering::Relaxed), 100);
}

struct FixedHeader {
    len: usize,
}

impl Dissector for FixedHeader {
    fn dissect(&self, view: &ByteView, ctx: &mut Context<'_>) -> HandlerResult {
        view.bytes(0, self.len)?;
        let rest = view.tail(self.len)?;
        let inner = ctx.call_data(&rest)?;
        Ok(DissectResult::Consumed(self.len + inner))
    }
}

#[test]
fn struct_dissectors_and_string_keys() {
    let mut builder = RegistryBuilder::new();
    let proto = builder.register_protocol("fixed", "Fixed header").expect("protocol");
    builder.register_table("media_type", "Media type").expect("table");
    builder
        .register_handler_by_name(
            "media_type",
            "application/x-fixed",
            Handler::from_dissector(proto, FixedHeader { len: 3 }),
        )
        .expect("bind");
    let engine = DispatchEngine::new(builder.freeze().expect("freeze"));
    let data = engine.registry().default_handler().id();

    let outcome = engine.dissect("media_type", "application/x-fixed", &[9u8; 8], 8);
    assert_eq!(outcome.status, DissectStatus::Ok(8));
    assert_eq!(outcome.layers, vec![proto, data]);

    let short = engine.dissect("media_type", "application/x-fixed", &[9u8; 2], 2);
    assert!(matches!(short.status, DissectStatus::Malformed { protocol_id, .. } if protocol_id == proto));
    assert_eq!(short.consumed, 2);
}
