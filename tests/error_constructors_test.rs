use ladning::error::LadningError;

#[test]
fn error_constructors_group_1() {
    assert!(matches!(
        LadningError::config("x"),
        LadningError::Config { .. }
    ));
    assert!(matches!(
        LadningError::storage("x"),
        LadningError::Storage { .. }
    ));
    assert!(matches!(
        LadningError::reauth_required("tesla", "x"),
        LadningError::ReauthRequired { .. }
    ));
    assert!(matches!(LadningError::web("x"), LadningError::Web { .. }));
}

#[test]
fn error_constructors_group_2() {
    let ser: LadningError = serde_json::from_str::<u32>("not json").unwrap_err().into();
    assert!(matches!(ser, LadningError::Serialization { .. }));
    assert!(matches!(LadningError::io("x"), LadningError::Io { .. }));
    assert!(matches!(
        LadningError::validation("f", "m"),
        LadningError::Validation { .. }
    ));
    assert!(matches!(
        LadningError::generic("x"),
        LadningError::Generic { .. }
    ));
}

#[test]
fn error_classes() {
    assert!(LadningError::transient("x").is_transient());
    assert!(!LadningError::permanent("x").is_transient());
    assert!(LadningError::auth_expired("x").is_auth_expired());
    assert!(LadningError::reauth_required("easee", "x").is_reauth_required());
    assert!(LadningError::cancelled("x").is_cancelled());
    assert!(!LadningError::transient("x").is_auth_expired());
}

#[test]
fn display_messages() {
    let e = LadningError::validation("field", "bad");
    assert!(format!("{}", e).contains("Validation error"));

    let e = LadningError::reauth_required("tesla", "no cached token");
    let s = e.to_string();
    assert!(s.contains("tesla"));
    assert!(s.contains("no cached token"));
}
