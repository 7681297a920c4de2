//! Security administration: users, roles and privileges

use crate::common::*;
use aeroclient::{Privilege, PrivilegeCode, ResultCode};

#[test]
fn onboarding_a_team() {
    let c = client();
    let analytics = Privilege::scoped(PrivilegeCode::Read, NS, Some("events"));
    c.admin_create_role("analyst", &[analytics.clone()], &[], 500, 0, None)
        .unwrap();
    for user in ["dana", "eli", "fay"] {
        c.admin_create_user(user, "initial-pw", &["analyst", "read"], None)
            .unwrap();
    }

    let users = c.admin_query_users(None).unwrap();
    let names: Vec<_> = users.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["dana", "eli", "fay"]);
    assert!(users
        .iter()
        .all(|u| u.roles == vec!["analyst".to_string(), "read".to_string()]));

    // Widen the role, then narrow it again
    let write = Privilege::scoped(PrivilegeCode::ReadWrite, NS, Some("events"));
    c.admin_grant_privileges("analyst", &[write.clone()], None)
        .unwrap();
    assert_eq!(
        c.admin_query_role("analyst", None).unwrap().privileges,
        vec![analytics.clone(), write.clone()]
    );
    c.admin_revoke_privileges("analyst", &[write], None).unwrap();
    assert_eq!(
        c.admin_query_role("analyst", None).unwrap().privileges,
        vec![analytics]
    );

    c.admin_set_whitelist("analyst", &["10.1.0.0/16"], None).unwrap();
    assert_eq!(
        c.admin_query_role("analyst", None).unwrap().whitelist,
        vec!["10.1.0.0/16".to_string()]
    );

    // Dropping the role removes it from every user
    c.admin_drop_role("analyst", None).unwrap();
    for user in ["dana", "eli", "fay"] {
        assert_eq!(
            c.admin_query_user(user, None).unwrap().roles,
            vec!["read".to_string()]
        );
    }
}

#[test]
fn predefined_roles_listed_and_protected() {
    let c = client();
    let roles = c.admin_query_roles(None).unwrap();
    for name in ["read", "read-write", "sys-admin", "user-admin", "truncate"] {
        let role = roles.iter().find(|r| r.name == name).unwrap();
        assert_eq!(role.privileges.len(), 1);
        assert!(role.privileges[0].code.is_global());
    }
    let err = c.admin_drop_role("read-write", None).unwrap_err();
    assert_eq!(err.code(), ResultCode::InvalidRole);
}

#[test]
fn password_changes() {
    let c = client();
    c.admin_create_user("gus", "first", &[], None).unwrap();
    c.admin_change_password("gus", "second", None).unwrap();
    let err = c.admin_set_password("gus", "second", None).unwrap_err();
    assert_eq!(err.code(), ResultCode::InvalidPassword);
    let err = c
        .admin_change_password("nobody", "x", None)
        .unwrap_err();
    assert_eq!(err.code(), ResultCode::InvalidUser);
}

#[test]
fn global_privilege_cannot_be_scoped() {
    let c = client();
    let bad = Privilege::scoped(PrivilegeCode::SysAdmin, NS, None);
    let err = c
        .admin_create_role("ops", &[bad], &[], 0, 0, None)
        .unwrap_err();
    assert!(err.is_param());
    assert_eq!(
        c.admin_query_role("ops", None).unwrap_err().code(),
        ResultCode::InvalidRole
    );
}

#[test]
fn duplicate_user_rejected() {
    let c = client();
    c.admin_create_user("hal", "pw", &["read"], None).unwrap();
    let err = c.admin_create_user("hal", "pw2", &[], None).unwrap_err();
    assert_eq!(err.code(), ResultCode::UserAlreadyExists);
    assert_eq!(err.subject(), Some("hal"));
}

#[test]
fn user_listing_exports_as_json() {
    let c = client();
    c.admin_create_user("ivy", "pw", &["read"], None).unwrap();
    let users = c.admin_query_users(None).unwrap();
    let json = serde_json::to_value(&users).unwrap();
    assert_eq!(json[0]["name"], "ivy");
    assert_eq!(json[0]["roles"][0], "read");
}
