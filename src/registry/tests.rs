use super::*;
use crate::bus::Handler;
use parking_lot::Mutex;
use proptest::prelude::*;

fn note_control(name: &str, identifier: u8) -> ControlRef {
    ControlDescriptor::new(name, 0, identifier, status::NOTE_ON).into_ref()
}

fn cc_control(name: &str, identifier: u8) -> ControlRef {
    ControlDescriptor::new(name, 0, identifier, status::CONTROL_CHANGE).into_ref()
}

fn counter(bus: &EventBus, channel: &str) -> Arc<Mutex<usize>> {
    let count = Arc::new(Mutex::new(0));
    let c = count.clone();
    bus.on(channel, move |_| *c.lock() += 1);
    count
}

fn note_on(identifier: u8) -> MidiMsg {
    MidiMsg::on_channel(status::NOTE_ON, 0, identifier, 127)
}

#[test]
fn test_most_recent_registration_wins() {
    let registry = ControlRegistry::new(EventBus::new());
    let older = note_control("older", 10);
    let newer = note_control("newer", 10);

    registry.register(&older);
    registry.register(&newer);
    registry.activate(&older);
    registry.activate(&newer);

    let id = note_on(10).identity();
    assert_eq!(registry.controls_for(&id), vec!["newer", "older"]);

    let mut msg = note_on(10);
    assert_eq!(
        registry.route(&mut msg),
        RouteOutcome::Delivered {
            control: "newer".into()
        }
    );
}

#[test]
fn test_unregister_restores_previous_owner() {
    let bus = EventBus::new();
    let registry = ControlRegistry::new(bus.clone());
    let older = note_control("older", 10);
    let newer = note_control("newer", 10);
    let older_hits = counter(&bus, "older.value");
    let newer_hits = counter(&bus, "newer.value");

    registry.register(&older);
    registry.activate(&older);
    registry.register(&newer);
    registry.activate(&newer);

    registry.route(&mut note_on(10));
    registry.unregister(&newer);
    registry.route(&mut note_on(10));

    assert_eq!(*newer_hits.lock(), 1);
    assert_eq!(*older_hits.lock(), 1);
}

#[test]
fn test_duplicate_register_is_ignored() {
    let registry = ControlRegistry::new(EventBus::new()).with_diagnostics(true);
    let play = note_control("play", 45);

    registry.register(&play);
    registry.register(&play);

    for id in play.identities() {
        assert_eq!(registry.controls_for(&id), vec!["play"]);
    }
}

#[test]
fn test_note_on_control_claims_note_off() {
    let registry = ControlRegistry::new(EventBus::new());
    let play = note_control("play", 45);
    registry.register(&play);

    let off = MidiMsg::on_channel(status::NOTE_OFF, 0, 45, 0);
    assert_eq!(registry.controls_for(&off.identity()), vec!["play"]);
    assert_eq!(registry.len(), 2);

    let fader = cc_control("volume", 7);
    assert_eq!(fader.identities().len(), 1);
}

#[test]
fn test_register_then_unregister_leaves_nothing() {
    let registry = ControlRegistry::new(EventBus::new());
    let play = note_control("play", 45);

    registry.register(&play);
    assert!(registry.is_registered(&play));
    registry.unregister(&play);

    assert!(!registry.is_registered(&play));
    assert!(registry.is_empty());
}

#[test]
fn test_unregister_unknown_is_noop() {
    let registry = ControlRegistry::new(EventBus::new()).with_diagnostics(true);
    let play = note_control("play", 45);
    registry.unregister(&play);
    assert!(registry.is_empty());
}

#[test]
fn test_unrouted_message() {
    let registry = ControlRegistry::new(EventBus::new());
    let mut msg = note_on(99);
    assert_eq!(registry.route(&mut msg), RouteOutcome::Unrouted);
    assert!(!msg.handled);
}

#[test]
fn test_inactive_control_swallows_message() {
    let bus = EventBus::new();
    let registry = ControlRegistry::new(bus.clone());
    let play = note_control("play", 45);
    let hits = counter(&bus, "play.value");
    registry.register(&play);

    let mut msg = note_on(45);
    let outcome = registry.route(&mut msg);

    assert_eq!(
        outcome,
        RouteOutcome::Inactive {
            control: "play".into()
        }
    );
    assert!(msg.handled);
    assert_eq!(*hits.lock(), 0);
}

#[test]
fn test_inactive_playable_passes_through() {
    let registry = ControlRegistry::new(EventBus::new());
    let pad = ControlDescriptor::new("pad", 9, 36, status::NOTE_ON)
        .playable(true)
        .into_ref();
    registry.register(&pad);

    let mut msg = MidiMsg::on_channel(status::NOTE_ON, 9, 36, 90);
    registry.route(&mut msg);
    assert!(!msg.handled);
}

#[test]
fn test_set_active_does_not_reorder() {
    let registry = ControlRegistry::new(EventBus::new());
    let a = note_control("a", 1);
    let b = note_control("b", 1);
    registry.register(&a);
    registry.register(&b);

    registry.activate(&a);
    registry.deactivate(&b);

    let id = note_on(1).identity();
    assert_eq!(registry.controls_for(&id), vec!["b", "a"]);
    let front = registry.front(&id).unwrap();
    assert_eq!(front.control.name, "b");
    assert!(!front.active);
    assert!(registry.is_active(&a));
    assert!(!registry.is_active(&b));
}

#[test]
fn test_modifier_redirects_to_combo() {
    let bus = EventBus::new();
    let registry = ControlRegistry::new(bus.clone());
    let jog = cc_control("jog", 60);
    let combo = cc_control("shift_jog", 60);
    let jog_hits = counter(&bus, "jog.value");
    let combo_hits = counter(&bus, "shift_jog.value");

    registry.register(&jog);
    registry.activate(&jog);
    registry.add_modifier(&jog, &combo);

    let mut msg = MidiMsg::on_channel(status::CONTROL_CHANGE, 0, 60, 1);
    assert_eq!(
        registry.route(&mut msg),
        RouteOutcome::Redirected {
            control: "jog".into(),
            modifier: "shift_jog".into()
        }
    );
    assert!(msg.handled);
    assert_eq!(*jog_hits.lock(), 0);
    assert_eq!(*combo_hits.lock(), 1);

    registry.remove_modifier(&jog, &combo);
    registry.route(&mut MidiMsg::on_channel(status::CONTROL_CHANGE, 0, 60, 1));
    assert_eq!(*jog_hits.lock(), 1);
    assert_eq!(*combo_hits.lock(), 1);
}

#[test]
fn test_stale_modifier_removal_keeps_current() {
    let registry = ControlRegistry::new(EventBus::new()).with_diagnostics(true);
    let jog = cc_control("jog", 60);
    let first = cc_control("shift_jog", 60);
    let second = cc_control("alt_jog", 60);

    registry.add_modifier(&jog, &first);
    registry.add_modifier(&jog, &second);
    registry.remove_modifier(&jog, &first);

    assert_eq!(registry.modifier_for("jog").unwrap().name, "alt_jog");

    registry.remove_modifier(&jog, &second);
    assert!(registry.modifier_for("jog").is_none());
}

#[test]
fn test_modifier_ignored_while_target_inactive() {
    let bus = EventBus::new();
    let registry = ControlRegistry::new(bus.clone());
    let jog = cc_control("jog", 60);
    let combo = cc_control("shift_jog", 60);
    let combo_hits = counter(&bus, "shift_jog.value");

    registry.register(&jog);
    registry.add_modifier(&jog, &combo);
    registry.route(&mut MidiMsg::on_channel(status::CONTROL_CHANGE, 0, 60, 1));

    assert_eq!(*combo_hits.lock(), 0);
}

#[test]
fn test_hooks_run_after_publish_in_order() {
    let bus = EventBus::new();
    let registry = ControlRegistry::new(bus.clone());
    let log = Arc::new(Mutex::new(Vec::new()));
    let play = note_control("play", 45);

    {
        let log = log.clone();
        bus.on("play.value", move |_| log.lock().push("value".to_string()));
    }
    {
        let log = log.clone();
        play.set_feedback(Some(Arc::new(move |msg: &MidiMsg, control: &ControlDescriptor| {
            log.lock()
                .push(format!("feedback:{}:{}", control.name, msg.data2));
        })));
    }
    {
        let log = log.clone();
        play.set_translation(Some(Arc::new(move |_: &MidiMsg| {
            log.lock().push("translation".to_string());
        })));
    }

    registry.register(&play);
    registry.activate(&play);
    registry.route(&mut note_on(45));

    assert_eq!(
        *log.lock(),
        vec!["value", "feedback:play:127", "translation"]
    );
}

#[test]
fn test_hooks_skipped_on_modifier_path() {
    let registry = ControlRegistry::new(EventBus::new());
    let hits = Arc::new(Mutex::new(0));
    let jog = cc_control("jog", 60);
    {
        let hits = hits.clone();
        jog.set_translation(Some(Arc::new(move |_: &MidiMsg| *hits.lock() += 1)));
    }

    registry.register(&jog);
    registry.activate(&jog);
    registry.add_modifier(&jog, &cc_control("shift_jog", 60));
    registry.route(&mut MidiMsg::on_channel(status::CONTROL_CHANGE, 0, 60, 1));

    assert_eq!(*hits.lock(), 0);
}

#[test]
fn test_handler_can_unregister_during_route() {
    let bus = EventBus::new();
    let registry = ControlRegistry::new(bus.clone());
    let play = note_control("play", 45);
    registry.register(&play);
    registry.activate(&play);

    let handler = {
        let registry = registry.clone();
        let play = play.clone();
        Handler::new(move |_| registry.unregister(&play))
    };
    bus.subscribe("play.value", &handler);

    registry.route(&mut note_on(45));
    assert!(!registry.is_registered(&play));
    assert_eq!(registry.route(&mut note_on(45)), RouteOutcome::Unrouted);
}

proptest! {
    #[test]
    fn prop_buckets_never_hold_duplicates(
        ops in prop::collection::vec((0usize..4, any::<bool>()), 0..40)
    ) {
        let registry = ControlRegistry::new(EventBus::new());
        let controls: Vec<ControlRef> = (0..4)
            .map(|i| note_control(&format!("c{}", i), 5))
            .collect();

        for (index, register) in ops {
            if register {
                registry.register(&controls[index]);
            } else {
                registry.unregister(&controls[index]);
            }
        }

        for entry in registry.entries() {
            let names = registry.controls_for(&entry.id);
            let mut unique = names.clone();
            unique.sort();
            unique.dedup();
            prop_assert_eq!(names.len(), unique.len());
        }
    }

    #[test]
    fn prop_matched_register_unregister_is_empty(
        ids in prop::collection::vec(0u8..16, 1..20)
    ) {
        let registry = ControlRegistry::new(EventBus::new());
        let controls: Vec<ControlRef> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| note_control(&format!("c{}", i), *id))
            .collect();

        for control in &controls {
            registry.register(control);
        }
        for control in controls.iter().rev() {
            registry.unregister(control);
        }
        prop_assert!(registry.is_empty());
    }
}
