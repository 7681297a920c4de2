//! Users and roles of the in-process cluster

use crate::admin::{AdminCommand, AdminResponse, Privilege, PrivilegeCode, RoleInfo, UserInfo};
use aeroclient_core::{Error, Result, ResultCode};
use std::collections::BTreeMap;

const PREDEFINED_ROLES: [(&str, PrivilegeCode); 10] = [
    ("user-admin", PrivilegeCode::UserAdmin),
    ("sys-admin", PrivilegeCode::SysAdmin),
    ("data-admin", PrivilegeCode::DataAdmin),
    ("udf-admin", PrivilegeCode::UdfAdmin),
    ("sindex-admin", PrivilegeCode::SIndexAdmin),
    ("read", PrivilegeCode::Read),
    ("read-write", PrivilegeCode::ReadWrite),
    ("read-write-udf", PrivilegeCode::ReadWriteUdf),
    ("write", PrivilegeCode::Write),
    ("truncate", PrivilegeCode::Truncate),
];

#[derive(Debug, Clone)]
struct StoredUser {
    password: String,
    roles: Vec<String>,
}

#[derive(Debug)]
pub(crate) struct Security {
    users: BTreeMap<String, StoredUser>,
    roles: BTreeMap<String, RoleInfo>,
}

impl Default for Security {
    fn default() -> Self {
        let roles = PREDEFINED_ROLES
            .iter()
            .map(|(name, code)| {
                let role = RoleInfo {
                    name: name.to_string(),
                    privileges: vec![Privilege::global(*code)],
                    ..RoleInfo::default()
                };
                (name.to_string(), role)
            })
            .collect();
        Security {
            users: BTreeMap::new(),
            roles,
        }
    }
}

fn is_predefined(role: &str) -> bool {
    PREDEFINED_ROLES.iter().any(|(name, _)| *name == role)
}

fn invalid_user(user: &str) -> Error {
    Error::new(ResultCode::InvalidUser, format!("no user {}", user))
}

fn invalid_role(role: &str) -> Error {
    Error::new(ResultCode::InvalidRole, format!("no role {}", role))
}

impl Security {
    fn user_mut(&mut self, user: &str) -> Result<&mut StoredUser> {
        self.users.get_mut(user).ok_or_else(|| invalid_user(user))
    }

    fn role_mut(&mut self, role: &str) -> Result<&mut RoleInfo> {
        self.roles.get_mut(role).ok_or_else(|| invalid_role(role))
    }

    fn check_roles(&self, roles: &[String]) -> Result<()> {
        match roles.iter().find(|r| !self.roles.contains_key(*r)) {
            Some(missing) => Err(invalid_role(missing)),
            None => Ok(()),
        }
    }

    fn user_info(name: &str, user: &StoredUser) -> UserInfo {
        UserInfo {
            name: name.to_string(),
            roles: user.roles.clone(),
            ..UserInfo::default()
        }
    }

    pub(crate) fn execute(&mut self, command: &AdminCommand) -> Result<AdminResponse> {
        match command {
            AdminCommand::CreateUser {
                user,
                password,
                roles,
            } => {
                if self.users.contains_key(user) {
                    return Err(Error::new(
                        ResultCode::UserAlreadyExists,
                        format!("user {} already exists", user),
                    ));
                }
                self.check_roles(roles)?;
                self.users.insert(
                    user.clone(),
                    StoredUser {
                        password: password.clone(),
                        roles: roles.clone(),
                    },
                );
            }
            AdminCommand::DropUser { user } => {
                self.users.remove(user).ok_or_else(|| invalid_user(user))?;
            }
            AdminCommand::SetPassword { user, password }
            | AdminCommand::ChangePassword { user, password } => {
                let stored = self.user_mut(user)?;
                if stored.password == *password {
                    return Err(Error::new(
                        ResultCode::InvalidPassword,
                        "new password must differ from the current one",
                    ));
                }
                stored.password = password.clone();
            }
            AdminCommand::GrantRoles { user, roles } => {
                self.check_roles(roles)?;
                let stored = self.user_mut(user)?;
                for role in roles {
                    if !stored.roles.contains(role) {
                        stored.roles.push(role.clone());
                    }
                }
            }
            AdminCommand::RevokeRoles { user, roles } => {
                self.user_mut(user)?.roles.retain(|r| !roles.contains(r));
            }
            AdminCommand::QueryUser { user } => {
                let stored = self.users.get(user).ok_or_else(|| invalid_user(user))?;
                return Ok(AdminResponse::User(Self::user_info(user, stored)));
            }
            AdminCommand::QueryUsers => {
                let users = self
                    .users
                    .iter()
                    .map(|(name, user)| Self::user_info(name, user))
                    .collect();
                return Ok(AdminResponse::Users(users));
            }
            AdminCommand::CreateRole {
                role,
                privileges,
                whitelist,
                read_quota,
                write_quota,
            } => {
                if self.roles.contains_key(role) {
                    return Err(Error::new(
                        ResultCode::RoleAlreadyExists,
                        format!("role {} already exists", role),
                    ));
                }
                let info = RoleInfo {
                    name: role.clone(),
                    privileges: privileges.clone(),
                    whitelist: whitelist.clone(),
                    read_quota: *read_quota,
                    write_quota: *write_quota,
                };
                self.roles.insert(role.clone(), info);
            }
            AdminCommand::DropRole { role } => {
                if is_predefined(role) {
                    return Err(Error::new(
                        ResultCode::InvalidRole,
                        format!("predefined role {} cannot be dropped", role),
                    ));
                }
                self.roles.remove(role).ok_or_else(|| invalid_role(role))?;
                for user in self.users.values_mut() {
                    user.roles.retain(|r| r != role);
                }
            }
            AdminCommand::GrantPrivileges { role, privileges } => {
                let info = self.role_mut(role)?;
                for p in privileges {
                    if !info.privileges.contains(p) {
                        info.privileges.push(p.clone());
                    }
                }
            }
            AdminCommand::RevokePrivileges { role, privileges } => {
                self.role_mut(role)?
                    .privileges
                    .retain(|p| !privileges.contains(p));
            }
            AdminCommand::SetWhitelist { role, whitelist } => {
                self.role_mut(role)?.whitelist = whitelist.clone();
            }
            AdminCommand::SetQuotas {
                role,
                read_quota,
                write_quota,
            } => {
                let info = self.role_mut(role)?;
                info.read_quota = *read_quota;
                info.write_quota = *write_quota;
            }
            AdminCommand::QueryRole { role } => {
                let info = self.roles.get(role).ok_or_else(|| invalid_role(role))?;
                return Ok(AdminResponse::Role(info.clone()));
            }
            AdminCommand::QueryRoles => {
                return Ok(AdminResponse::Roles(self.roles.values().cloned().collect()));
            }
        }
        Ok(AdminResponse::Ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_user(user: &str, roles: &[&str]) -> AdminCommand {
        AdminCommand::CreateUser {
            user: user.to_string(),
            password: "pw".to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[test]
    fn test_predefined_roles_present() {
        let mut s = Security::default();
        let AdminResponse::Roles(roles) = s.execute(&AdminCommand::QueryRoles).unwrap() else {
            panic!("expected roles");
        };
        assert_eq!(roles.len(), PREDEFINED_ROLES.len());
        let err = s
            .execute(&AdminCommand::DropRole {
                role: "read".into(),
            })
            .unwrap_err();
        assert_eq!(err.code(), ResultCode::InvalidRole);
    }

    #[test]
    fn test_duplicate_user_and_unknown_role() {
        let mut s = Security::default();
        s.execute(&create_user("ann", &["read"])).unwrap();
        let err = s.execute(&create_user("ann", &[])).unwrap_err();
        assert_eq!(err.code(), ResultCode::UserAlreadyExists);
        let err = s.execute(&create_user("bob", &["nope"])).unwrap_err();
        assert_eq!(err.code(), ResultCode::InvalidRole);
    }

    #[test]
    fn test_drop_role_strips_grants() {
        let mut s = Security::default();
        s.execute(&AdminCommand::CreateRole {
            role: "ops".into(),
            privileges: vec![],
            whitelist: vec![],
            read_quota: 0,
            write_quota: 0,
        })
        .unwrap();
        s.execute(&create_user("ann", &["ops", "read"])).unwrap();
        s.execute(&AdminCommand::DropRole { role: "ops".into() })
            .unwrap();
        let AdminResponse::User(info) = s
            .execute(&AdminCommand::QueryUser { user: "ann".into() })
            .unwrap()
        else {
            panic!("expected user");
        };
        assert_eq!(info.roles, vec!["read".to_string()]);
    }

    #[test]
    fn test_password_must_change() {
        let mut s = Security::default();
        s.execute(&create_user("ann", &[])).unwrap();
        let err = s
            .execute(&AdminCommand::SetPassword {
                user: "ann".into(),
                password: "pw".into(),
            })
            .unwrap_err();
        assert_eq!(err.code(), ResultCode::InvalidPassword);
    }
}
