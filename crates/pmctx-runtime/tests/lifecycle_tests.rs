use pmctx_runtime::{ClientConfig, Error, Registry, SlotState};
use pmctx_testing::assertions::assert_slots_settled;
use pmctx_testing::{CountingBinder, MockTransport};
use pmctx_types::{ContextFlags, ContextHandle, ContextKind};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn registry_with(transport: Arc<MockTransport>) -> Registry {
    Registry::builder()
        .config(ClientConfig::default())
        .transport(transport)
        .build()
}

#[test]
fn test_create_host_sets_current() {
    let transport = Arc::new(MockTransport::new());
    let registry = registry_with(transport.clone());

    let handle = registry.create_context(ContextKind::Host, "web01:4000").unwrap();
    assert_eq!(registry.which_context().unwrap(), handle);
    assert_eq!(registry.context_host_name(handle).unwrap(), "web01");
    assert_eq!(
        registry.context_timeout(handle).unwrap(),
        Duration::from_secs(10)
    );
    let peer = registry
        .with_context(handle, |ctx| ctx.live().and_then(|l| l.peer()))
        .unwrap();
    assert_eq!(peer.as_deref(), Some("web01:4000"));
    assert_eq!(transport.attempts(), 1);
}

#[test]
fn test_host_attributes_become_flags() {
    let registry = registry_with(Arc::new(MockTransport::new()));
    let handle = registry
        .create_context(ContextKind::Host, "pcp://web01?compress&container=db")
        .unwrap();
    let flags = registry.with_context(handle, |ctx| ctx.flags()).unwrap();
    assert!(flags.contains(ContextFlags::COMPRESS));
    assert!(flags.contains(ContextFlags::CONTAINER));
}

#[test]
fn test_failed_create_restores_current_and_frees_slot() {
    let transport = Arc::new(MockTransport::new());
    let registry = registry_with(transport.clone());
    let first = registry.create_context(ContextKind::Host, "web01").unwrap();

    transport.push_failure("connection refused");
    let err = registry.create_context(ContextKind::Host, "web02").unwrap_err();
    assert!(matches!(err, Error::ConnectFailed(_)));
    assert!(!err.is_timeout());

    assert_eq!(registry.which_context().unwrap(), first);
    assert_eq!(
        registry.slot_states(),
        vec![SlotState::Ready(first), SlotState::Free]
    );
}

#[test]
fn test_bad_host_spec() {
    let registry = registry_with(Arc::new(MockTransport::new()));
    let err = registry.create_context(ContextKind::Host, "web01:0").unwrap_err();
    assert!(matches!(err, Error::BadSpecification(_)));
    assert!(matches!(registry.which_context(), Err(Error::NoContext)));
}

#[test]
fn test_uncreatable_kind_rejected() {
    let registry = registry_with(Arc::new(MockTransport::new()));
    for kind in [ContextKind::Uninitialized, ContextKind::TearingDown] {
        let err = registry.create_context(kind, "x").unwrap_err();
        assert!(matches!(err, Error::BadSpecification(_)));
    }
    assert!(registry.slot_states().is_empty());
}

#[test]
fn test_use_and_which() {
    let registry = registry_with(Arc::new(MockTransport::new()));
    assert!(matches!(registry.which_context(), Err(Error::NoContext)));

    let a = registry.create_context(ContextKind::Host, "a").unwrap();
    let b = registry.create_context(ContextKind::Host, "b").unwrap();
    assert_eq!(registry.which_context().unwrap(), b);

    registry.use_context(a).unwrap();
    assert_eq!(registry.which_context().unwrap(), a);

    let err = registry.use_context(ContextHandle::new(99)).unwrap_err();
    assert!(matches!(err, Error::NoSuchContext(h) if h.as_raw() == 99));
    assert_eq!(registry.which_context().unwrap(), a);

    registry.clear_current();
    assert!(matches!(registry.which_context(), Err(Error::NoContext)));
}

#[test]
fn test_destroy_invalidates_handle_and_reuses_slot() {
    let transport = Arc::new(MockTransport::new());
    let registry = registry_with(transport.clone());
    let a = registry.create_context(ContextKind::Host, "a").unwrap();
    let b = registry.create_context(ContextKind::Host, "b").unwrap();

    registry.destroy_context(a).unwrap();
    assert_eq!(transport.closed(), 1);
    assert!(matches!(
        registry.destroy_context(a),
        Err(Error::NoSuchContext(_))
    ));
    assert!(matches!(
        registry.use_context(a),
        Err(Error::NoSuchContext(_))
    ));
    // b is still current
    assert_eq!(registry.which_context().unwrap(), b);

    let c = registry.create_context(ContextKind::Host, "c").unwrap();
    assert!(c > b);
    assert_eq!(
        registry.slot_states(),
        vec![SlotState::Ready(c), SlotState::Ready(b)]
    );
    assert_slots_settled(&registry).unwrap();
}

#[test]
fn test_destroy_current_clears_it() {
    let registry = registry_with(Arc::new(MockTransport::new()));
    let a = registry.create_context(ContextKind::Host, "a").unwrap();
    registry.destroy_context(a).unwrap();
    assert!(matches!(registry.which_context(), Err(Error::NoContext)));
}

#[test]
fn test_handles_never_repeat() {
    let registry = registry_with(Arc::new(MockTransport::new()));
    let mut seen = HashSet::new();
    for _ in 0..50 {
        let h = registry.create_context(ContextKind::Host, "a").unwrap();
        assert!(seen.insert(h), "handle {} issued twice", h);
        registry.destroy_context(h).unwrap();
    }
    assert_eq!(registry.slot_states(), vec![SlotState::Free]);
}

#[test]
fn test_duplicate_is_independent() {
    let transport = Arc::new(MockTransport::new());
    let registry = registry_with(transport.clone());
    let src = registry.create_context(ContextKind::Host, "web01").unwrap();
    registry.add_profile(Some(7), &[1, 2]).unwrap();

    let dup = registry.duplicate_context().unwrap();
    assert_ne!(dup, src);
    assert_eq!(registry.which_context().unwrap(), dup);
    // the duplicate rides on the source's connection
    assert_eq!(transport.attempts(), 1);

    let copied = registry
        .with_context(dup, |ctx| ctx.profile().clone())
        .unwrap();
    assert_eq!(
        copied,
        registry.with_context(src, |ctx| ctx.profile().clone()).unwrap()
    );

    registry.delete_profile(None, &[]).unwrap();
    registry
        .with_context(dup, |ctx| ctx.window_mut().delta_ms = 500)
        .unwrap();

    let (src_profile, src_delta) = registry
        .with_context(src, |ctx| (ctx.profile().clone(), ctx.window().delta_ms))
        .unwrap();
    assert_eq!(src_profile, copied);
    assert_eq!(src_delta, 0);

    registry.destroy_context(src).unwrap();
    assert_eq!(transport.closed(), 0);
    assert_eq!(registry.context_host_name(dup).unwrap(), "web01");
}

#[test]
fn test_same_host_shares_connection() {
    let transport = Arc::new(MockTransport::new());
    let registry = registry_with(transport.clone());

    let a = registry.create_context(ContextKind::Host, "web01").unwrap();
    let b = registry.create_context(ContextKind::Host, "web01").unwrap();
    let private = registry
        .create_context(ContextKind::Host, "web01?exclusive")
        .unwrap();

    assert_eq!(transport.attempts(), 2);
    assert_eq!(registry.shared_links(), vec![("web01".to_string(), 2)]);
    let link = |h| {
        registry
            .with_context(h, |ctx| Arc::clone(ctx.live().unwrap().link()))
            .unwrap()
    };
    assert!(Arc::ptr_eq(&link(a), &link(b)));
    assert!(!Arc::ptr_eq(&link(a), &link(private)));
    assert!(link(private).is_exclusive());
}

#[test]
fn test_proxied_and_other_port_targets_do_not_share() {
    let transport = Arc::new(MockTransport::new());
    let registry = registry_with(transport.clone());

    registry.create_context(ContextKind::Host, "web01").unwrap();
    registry.create_context(ContextKind::Host, "web01:4000").unwrap();
    registry.create_context(ContextKind::Host, "web01@gw").unwrap();
    assert_eq!(transport.attempts(), 3);
    assert_eq!(registry.shared_links().len(), 2);
}

#[test]
fn test_shared_connection_closes_with_last_user() {
    let transport = Arc::new(MockTransport::new());
    let registry = registry_with(transport.clone());
    let a = registry.create_context(ContextKind::Host, "web01").unwrap();
    let b = registry.create_context(ContextKind::Host, "web01").unwrap();
    let private = registry
        .create_context(ContextKind::Host, "web01?exclusive")
        .unwrap();

    registry.destroy_context(a).unwrap();
    assert_eq!(transport.closed(), 0);
    assert_eq!(registry.shared_links(), vec![("web01".to_string(), 1)]);
    let connected = registry
        .with_context(b, |ctx| ctx.live().unwrap().is_connected())
        .unwrap();
    assert!(connected);

    registry.destroy_context(private).unwrap();
    assert_eq!(transport.closed(), 1);
    registry.destroy_context(b).unwrap();
    assert_eq!(transport.closed(), 2);
    assert!(registry.shared_links().is_empty());

    // nothing left to share, so the next context dials again
    registry.create_context(ContextKind::Host, "web01").unwrap();
    assert_eq!(transport.attempts(), 3);
}

#[test]
fn test_failed_create_does_not_join_shared_connection() {
    let transport = Arc::new(MockTransport::new());
    let registry = registry_with(transport.clone());
    registry
        .create_context(ContextKind::Host, "web01?exclusive")
        .unwrap();

    transport.push_failure("connection refused");
    assert!(registry.create_context(ContextKind::Host, "web01").is_err());
    assert!(registry.shared_links().is_empty());
}

#[test]
fn test_duplicate_without_current() {
    let registry = registry_with(Arc::new(MockTransport::new()));
    assert!(matches!(
        registry.duplicate_context(),
        Err(Error::NoContext)
    ));
}

#[test]
fn test_local_context_single_thread_only() {
    let registry = Arc::new(registry_with(Arc::new(MockTransport::new())));
    let local = registry.create_context(ContextKind::Local, "").unwrap();
    assert!(!registry.context_host_name(local).unwrap().is_empty());
    assert!(matches!(
        registry.context_timeout(local),
        Err(Error::NotHost(_))
    ));

    let other = Arc::clone(&registry);
    std::thread::spawn(move || {
        other.create_context(ContextKind::Host, "web01").unwrap();
    })
    .join()
    .unwrap();

    let err = registry.create_context(ContextKind::Local, "").unwrap_err();
    assert!(matches!(err, Error::ThreadingRestriction(_)));
    assert_eq!(registry.which_context().unwrap(), local);
}

#[test]
fn test_current_context_is_per_thread() {
    let registry = Arc::new(registry_with(Arc::new(MockTransport::new())));
    let mine = registry.create_context(ContextKind::Host, "a").unwrap();

    let other = Arc::clone(&registry);
    let theirs = std::thread::spawn(move || {
        assert!(matches!(other.which_context(), Err(Error::NoContext)));
        let h = other.create_context(ContextKind::Host, "b").unwrap();
        assert_eq!(other.which_context().unwrap(), h);
        h
    })
    .join()
    .unwrap();

    assert_ne!(mine, theirs);
    assert_eq!(registry.which_context().unwrap(), mine);
}

#[test]
fn test_current_destroyed_elsewhere_is_forgotten() {
    let registry = Arc::new(registry_with(Arc::new(MockTransport::new())));
    let mine = registry.create_context(ContextKind::Host, "a").unwrap();

    let other = Arc::clone(&registry);
    std::thread::spawn(move || other.destroy_context(mine).unwrap())
        .join()
        .unwrap();

    assert!(matches!(registry.which_context(), Err(Error::NoContext)));
}

#[test]
fn test_binder_called_on_create_and_destroy() {
    let binder = Arc::new(CountingBinder::default());
    let registry = Registry::builder()
        .transport(Arc::new(MockTransport::new()))
        .binder(binder.clone())
        .build();

    let h = registry.create_context(ContextKind::Host, "a").unwrap();
    assert_eq!(binder.binds(), 1);
    registry.destroy_context(h).unwrap();
    assert_eq!(binder.unbinds(), 1);
}

#[test]
fn test_binder_failure_does_not_fail_create() {
    let binder = Arc::new(CountingBinder::failing());
    let registry = Registry::builder()
        .transport(Arc::new(MockTransport::new()))
        .binder(binder.clone())
        .build();

    let h = registry.create_context(ContextKind::Host, "a").unwrap();
    assert_eq!(binder.binds(), 1);
    assert_eq!(registry.which_context().unwrap(), h);
}

#[test]
fn test_dump_lists_contexts() {
    let registry = registry_with(Arc::new(MockTransport::new()));
    let a = registry.create_context(ContextKind::Host, "web01:4000").unwrap();
    let b = registry.create_context(ContextKind::Host, "web02").unwrap();

    let all = registry.dump_contexts(None);
    assert!(all.starts_with(&format!("Dump Contexts: current context = {}", b)));
    assert!(all.contains(&format!("Context[0] handle {}: host web01:4000", a)));
    assert!(all.contains("pmcd=connected(web01:4000)"));
    assert!(all.contains(&format!("Context[1] handle {}: host web02", b)));

    let one = registry.dump_contexts(Some(a));
    assert!(one.contains("web01"));
    assert!(!one.contains("web02"));

    let missing = registry.dump_contexts(Some(ContextHandle::new(42)));
    assert!(missing.contains("Context 42: no such context"));
}

#[test]
fn test_dump_lists_profile_instances() {
    let registry = registry_with(Arc::new(MockTransport::new()));
    let h = registry.create_context(ContextKind::Host, "web01").unwrap();
    registry.delete_profile(Some(7), &[3, 1]).unwrap();
    registry.delete_profile(Some(9), &[]).unwrap();
    registry.add_profile(Some(9), &[4]).unwrap();

    let all = registry.dump_contexts(Some(h));
    assert!(all.contains("profile: include by default, 2 domain(s), not sent"));
    assert!(all.contains("indom 7: include all, exclude [1 3]"));
    assert!(all.contains("indom 9: exclude all, include [4]"));
    assert!(all.contains("refcnt=1"));

    let one = registry.dump_contexts_indom(Some(h), Some(9));
    assert!(one.contains("indom 9:"));
    assert!(!one.contains("indom 7:"));
}
