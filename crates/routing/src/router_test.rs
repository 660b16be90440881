use crate::{RoutingError, TagRouter, UnitId};

#[test]
fn first_match_wins_in_insertion_order() {
    let mut router = TagRouter::new();
    router.add(r"app\..*", UnitId::new(1)).unwrap();
    router.add(r"app\.auth", UnitId::new(2)).unwrap();
    router.add(r".*", UnitId::new(3)).unwrap();

    // Both of the first two patterns match; insertion order decides.
    assert_eq!(router.route("app.auth"), Some(&UnitId::new(1)));
    assert_eq!(router.route("app.web"), Some(&UnitId::new(1)));
    assert_eq!(router.route("db.query"), Some(&UnitId::new(3)));
}

#[test]
fn no_match_routes_nowhere() {
    let mut router = TagRouter::new();
    router.add(r"^svc\.", UnitId::new(1)).unwrap();

    assert_eq!(router.route("app.web"), None);
}

#[test]
fn patterns_are_unanchored() {
    let mut router = TagRouter::new();
    router.add("web", UnitId::new(1)).unwrap();

    assert_eq!(router.route("svc.web.front"), Some(&UnitId::new(1)));
}

#[test]
fn invalid_pattern_fails_registration() {
    let mut router: TagRouter<UnitId> = TagRouter::new();
    let err = router.add("*", UnitId::new(1)).unwrap_err();
    assert!(matches!(err, RoutingError::InvalidPattern { .. }));
    assert!(router.is_empty());
}

#[test]
fn empty_router_is_empty() {
    let router: TagRouter<UnitId> = TagRouter::new();
    assert!(router.is_empty());
    assert_eq!(router.route("anything"), None);
}

#[test]
fn unit_id_display_and_control() {
    assert_eq!(UnitId::new(7).to_string(), "unit:7");
    assert!(UnitId::CONTROL.is_control());
    assert!(!UnitId::new(1).is_control());
    assert_eq!(i32::from(UnitId::new(9)), 9);
}
