use tierfab_core::*;

#[test]
fn routes_by_client_id() {
    assert_eq!(route_by_client(4, 2), 0);
    assert_eq!(route_by_client(5, 2), 1);
}

#[test]
fn routing_is_stateless() {
    let first: Vec<usize> = (0..50).map(|c| route_by_client(c, 3)).collect();
    let second: Vec<usize> = (0..50).rev().map(|c| route_by_client(c, 3)).rev().collect();
    assert_eq!(first, second);
    for (c, slot) in first.iter().enumerate() {
        assert_eq!(*slot, c % 3);
    }
}

#[test]
fn negative_client_ids_stay_in_range() {
    assert_eq!(route_by_client(-1, 2), 1);
    assert_eq!(route_by_client(-4, 3), 2);
    assert_eq!(route_by_client(i32::MIN, 7), (i32::MIN as i64).rem_euclid(7) as usize);
}

#[test]
fn round_robin_skips_dead_slot_without_retry() {
    let mut table: SlotTable<&str> = SlotTable::new(3);
    table.open(0, "w0", Some(10)).unwrap();
    table.open(1, "w1", Some(11)).unwrap();
    table.open(2, "w2", Some(12)).unwrap();
    table.mark_dead(1);

    let mut rr = RoundRobin::new(3);
    let mut outcomes = Vec::new();
    for _ in 0..4 {
        let slot = rr.next_slot();
        let d = if table.is_live(slot) { Delivery::Delivered } else { Delivery::Dropped };
        outcomes.push((slot, d));
    }

    assert_eq!(
        outcomes,
        vec![
            (0, Delivery::Delivered),
            (1, Delivery::Dropped),
            (2, Delivery::Delivered),
            (0, Delivery::Delivered),
        ]
    );
    assert_eq!(rr.cursor(), 1);
}

#[test]
fn cursor_is_request_count_mod_fanout() {
    let mut rr = RoundRobin::new(5);
    for n in 1..=23 {
        rr.next_slot();
        assert_eq!(rr.cursor(), n % 5);
    }
}

#[test]
fn dead_slots_never_reopen() {
    let mut table: SlotTable<u8> = SlotTable::new(2);
    table.open(0, 1, Some(100)).unwrap();
    assert_eq!(table.mark_dead(0), Some(1));
    assert_eq!(table.mark_dead(0), None);
    assert_eq!(table.open(0, 2, Some(101)), Err(SlotError::Dead(0)));
    assert_eq!(table.state(0), Some(SlotState::Dead));
    assert_eq!(table.pid(0), Some(100));
    assert_eq!(table.live_count(), 0);
}

#[test]
fn child_indices_are_globally_unique() {
    let topo = Topology::default();
    let mut seen = std::collections::HashSet::new();
    for lb in 0..topo.load_balancers as i32 {
        for rp_slot in 0..topo.reverse_proxies_per_balancer {
            let rp = global_index(rp_slot, lb, topo.reverse_proxies_per_balancer);
            for w_slot in 0..topo.workers_per_proxy {
                assert!(seen.insert(global_index(w_slot, rp, topo.workers_per_proxy)));
            }
        }
    }
    assert_eq!(seen.len(), topo.total(Role::Worker));
    assert!(seen.iter().all(|i| (*i as usize) < topo.total(Role::Worker)));
}

#[test]
fn identity_frame_decodes_at_root() {
    let report = IdentityReport::new(Role::Worker, 4, 4242);
    let frame = report.encode();
    assert_eq!(frame.as_bytes().len(), IDENTITY_FRAME_LEN);
    assert_eq!(frame.decode(), Ok(report));

    let mut raw = *frame.as_bytes();
    raw[0] = 9;
    assert_eq!(IdentityFrame::from(raw).decode(), Err(WireError::UnknownRole(9)));
}

#[test]
fn request_layout_is_fixed() {
    let req = Request::new(7, 2.25);
    let bytes = req.encode();
    assert_eq!(&bytes[0..4], &7i32.to_le_bytes());
    assert_eq!(&bytes[4..8], &2.25f32.to_bits().to_le_bytes());
    assert_eq!(Request::decode(&bytes), req);
}

#[test]
fn registry_ignores_out_of_range_reports() {
    let mut reg = IdentityRegistry::new(&Topology::default());
    assert_eq!(reg.capacity(Role::ReverseProxy), 2);
    assert_eq!(
        reg.record(&IdentityReport::new(Role::ReverseProxy, 2, 50)),
        RecordOutcome::OutOfRange
    );
    assert_eq!(
        reg.record(&IdentityReport::new(Role::ReverseProxy, 1, 50)),
        RecordOutcome::Recorded { previous: None }
    );
    assert_eq!(reg.known(Role::ReverseProxy), 1);
}

#[test]
fn shutdown_order_is_children_first() {
    let mut reg = IdentityRegistry::new(&Topology::default());
    reg.record_pid(Role::LoadBalancer, 0, 10);
    reg.record(&IdentityReport::new(Role::LoadBalancer, 0, 10));
    reg.record(&IdentityReport::new(Role::ReverseProxy, 0, 20));
    reg.record(&IdentityReport::new(Role::ReverseProxy, 1, 21));
    reg.record(&IdentityReport::new(Role::Worker, 5, 35));
    reg.record(&IdentityReport::new(Role::Worker, 0, 30));

    let order: Vec<(Role, i32)> = reg.shutdown_order().iter().map(|t| (t.role, t.pid)).collect();
    assert_eq!(
        order,
        vec![
            (Role::Worker, 30),
            (Role::Worker, 35),
            (Role::ReverseProxy, 20),
            (Role::ReverseProxy, 21),
            (Role::LoadBalancer, 10),
        ]
    );

    let snap = reg.snapshot();
    assert_eq!(snap.workers.len(), 6);
    assert_eq!(snap.load_balancers, vec![Some(10)]);
}

#[test]
fn oversized_topology_does_not_fit_wire_index() {
    assert!(Topology::default().fits_wire_index());

    let huge = Topology {
        load_balancers: 2,
        reverse_proxies_per_balancer: 65_536,
        workers_per_proxy: 65_536,
    };
    assert!(!huge.fits_wire_index());

    let overflow = Topology {
        load_balancers: usize::MAX,
        reverse_proxies_per_balancer: 2,
        workers_per_proxy: 1,
    };
    assert!(!overflow.fits_wire_index());
    assert_eq!(overflow.total(Role::Worker), usize::MAX);
}
