//! User and role administration
//!
//! Every call resolves an [`AdminPolicy`], validates its arguments locally
//! and hands one [`AdminCommand`] to the cluster. Failures are tagged with
//! the user or role they concern.

use crate::client::Client;
use aeroclient_core::{check_u32, param_error, Error, Result, Value};
use aeroclient_policy::{resolve, AdminPolicy};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Permission granted by a privilege
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrivilegeCode {
    /// Manage users and roles
    UserAdmin,
    /// Manage the cluster
    SysAdmin,
    /// Manage indexes and UDFs, truncate
    DataAdmin,
    /// Manage UDF modules
    UdfAdmin,
    /// Manage secondary indexes
    SIndexAdmin,
    /// Read records
    Read,
    /// Read and write records
    ReadWrite,
    /// Read, write and run UDFs
    ReadWriteUdf,
    /// Write records
    Write,
    /// Truncate sets and namespaces
    Truncate,
}

impl PrivilegeCode {
    /// Numeric code
    pub fn code(self) -> i64 {
        match self {
            PrivilegeCode::UserAdmin => 0,
            PrivilegeCode::SysAdmin => 1,
            PrivilegeCode::DataAdmin => 2,
            PrivilegeCode::UdfAdmin => 3,
            PrivilegeCode::SIndexAdmin => 4,
            PrivilegeCode::Read => 10,
            PrivilegeCode::ReadWrite => 11,
            PrivilegeCode::ReadWriteUdf => 12,
            PrivilegeCode::Write => 13,
            PrivilegeCode::Truncate => 14,
        }
    }

    /// Parse a numeric code
    pub fn from_code(code: i64) -> Result<Self> {
        Ok(match code {
            0 => PrivilegeCode::UserAdmin,
            1 => PrivilegeCode::SysAdmin,
            2 => PrivilegeCode::DataAdmin,
            3 => PrivilegeCode::UdfAdmin,
            4 => PrivilegeCode::SIndexAdmin,
            10 => PrivilegeCode::Read,
            11 => PrivilegeCode::ReadWrite,
            12 => PrivilegeCode::ReadWriteUdf,
            13 => PrivilegeCode::Write,
            14 => PrivilegeCode::Truncate,
            other => return Err(param_error!("invalid privilege code {}", other)),
        })
    }

    /// Global privileges cannot be scoped to a namespace or set
    pub fn is_global(self) -> bool {
        matches!(
            self,
            PrivilegeCode::UserAdmin | PrivilegeCode::SysAdmin | PrivilegeCode::UdfAdmin
        )
    }
}

/// A privilege, optionally scoped to a namespace and set
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Privilege {
    /// Permission
    pub code: PrivilegeCode,
    /// Namespace scope
    pub namespace: Option<String>,
    /// Set scope; requires a namespace
    pub set: Option<String>,
}

impl Privilege {
    /// Cluster-wide privilege
    pub fn global(code: PrivilegeCode) -> Self {
        Privilege {
            code,
            namespace: None,
            set: None,
        }
    }

    /// Privilege limited to a namespace, or a set within it
    pub fn scoped(code: PrivilegeCode, namespace: &str, set: Option<&str>) -> Self {
        Privilege {
            code,
            namespace: Some(namespace.to_string()),
            set: set.map(str::to_string),
        }
    }

    /// Decode `{"code": int, "ns": str, "set": str}`
    pub fn decode(value: &Value) -> Result<Self> {
        if value.as_map().is_none() {
            return Err(param_error!(
                "privilege must be a map, got {}",
                value.type_name()
            ));
        }
        let code = value
            .get("code")
            .and_then(Value::as_int)
            .ok_or_else(|| param_error!("privilege code must be an integer"))?;
        let text = |name: &str| -> Result<Option<String>> {
            match value.get(name) {
                None | Some(Value::Nil) => Ok(None),
                Some(Value::String(s)) if s.is_empty() => Ok(None),
                Some(Value::String(s)) => Ok(Some(s.clone())),
                Some(other) => Err(param_error!(
                    "privilege {} must be a string, got {}",
                    name,
                    other.type_name()
                )),
            }
        };
        let privilege = Privilege {
            code: PrivilegeCode::from_code(code)?,
            namespace: text("ns")?,
            set: text("set")?,
        };
        privilege.validate()?;
        Ok(privilege)
    }

    fn validate(&self) -> Result<()> {
        if self.set.is_some() && self.namespace.is_none() {
            return Err(param_error!("privilege set scope requires a namespace"));
        }
        if self.code.is_global() && self.namespace.is_some() {
            return Err(param_error!(
                "privilege {:?} is global and cannot be scoped",
                self.code
            ));
        }
        Ok(())
    }
}

/// User as reported by the cluster
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserInfo {
    /// User name
    pub name: String,
    /// Granted roles
    pub roles: Vec<String>,
    /// Read statistics
    pub read_info: Vec<u32>,
    /// Write statistics
    pub write_info: Vec<u32>,
    /// Open connections
    pub conns_in_use: u32,
}

/// Role as reported by the cluster
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoleInfo {
    /// Role name
    pub name: String,
    /// Granted privileges
    pub privileges: Vec<Privilege>,
    /// Allowed client addresses; empty allows all
    pub whitelist: Vec<String>,
    /// Records per second read limit; 0 means unlimited
    pub read_quota: u32,
    /// Records per second write limit; 0 means unlimited
    pub write_quota: u32,
}

/// One security command
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum AdminCommand {
    CreateUser {
        user: String,
        password: String,
        roles: Vec<String>,
    },
    DropUser {
        user: String,
    },
    SetPassword {
        user: String,
        password: String,
    },
    ChangePassword {
        user: String,
        password: String,
    },
    GrantRoles {
        user: String,
        roles: Vec<String>,
    },
    RevokeRoles {
        user: String,
        roles: Vec<String>,
    },
    QueryUser {
        user: String,
    },
    QueryUsers,
    CreateRole {
        role: String,
        privileges: Vec<Privilege>,
        whitelist: Vec<String>,
        read_quota: u32,
        write_quota: u32,
    },
    DropRole {
        role: String,
    },
    GrantPrivileges {
        role: String,
        privileges: Vec<Privilege>,
    },
    RevokePrivileges {
        role: String,
        privileges: Vec<Privilege>,
    },
    SetWhitelist {
        role: String,
        whitelist: Vec<String>,
    },
    SetQuotas {
        role: String,
        read_quota: u32,
        write_quota: u32,
    },
    QueryRole {
        role: String,
    },
    QueryRoles,
}

impl AdminCommand {
    /// Command name for logs
    pub fn name(&self) -> &'static str {
        match self {
            AdminCommand::CreateUser { .. } => "create_user",
            AdminCommand::DropUser { .. } => "drop_user",
            AdminCommand::SetPassword { .. } => "set_password",
            AdminCommand::ChangePassword { .. } => "change_password",
            AdminCommand::GrantRoles { .. } => "grant_roles",
            AdminCommand::RevokeRoles { .. } => "revoke_roles",
            AdminCommand::QueryUser { .. } => "query_user",
            AdminCommand::QueryUsers => "query_users",
            AdminCommand::CreateRole { .. } => "create_role",
            AdminCommand::DropRole { .. } => "drop_role",
            AdminCommand::GrantPrivileges { .. } => "grant_privileges",
            AdminCommand::RevokePrivileges { .. } => "revoke_privileges",
            AdminCommand::SetWhitelist { .. } => "set_whitelist",
            AdminCommand::SetQuotas { .. } => "set_quotas",
            AdminCommand::QueryRole { .. } => "query_role",
            AdminCommand::QueryRoles => "query_roles",
        }
    }

    /// User or role the command concerns
    pub fn subject(&self) -> Option<&str> {
        match self {
            AdminCommand::CreateUser { user, .. }
            | AdminCommand::DropUser { user }
            | AdminCommand::SetPassword { user, .. }
            | AdminCommand::ChangePassword { user, .. }
            | AdminCommand::GrantRoles { user, .. }
            | AdminCommand::RevokeRoles { user, .. }
            | AdminCommand::QueryUser { user } => Some(user),
            AdminCommand::CreateRole { role, .. }
            | AdminCommand::DropRole { role }
            | AdminCommand::GrantPrivileges { role, .. }
            | AdminCommand::RevokePrivileges { role, .. }
            | AdminCommand::SetWhitelist { role, .. }
            | AdminCommand::SetQuotas { role, .. }
            | AdminCommand::QueryRole { role } => Some(role),
            AdminCommand::QueryUsers | AdminCommand::QueryRoles => None,
        }
    }
}

/// Cluster answer to an [`AdminCommand`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminResponse {
    /// Command applied
    Ack,
    /// One user
    User(UserInfo),
    /// All users
    Users(Vec<UserInfo>),
    /// One role
    Role(RoleInfo),
    /// All roles
    Roles(Vec<RoleInfo>),
}

fn name_arg(what: &str, value: &str) -> Result<String> {
    if value.is_empty() {
        return Err(param_error!("{} name cannot be empty", what));
    }
    Ok(value.to_string())
}

fn name_list(what: &str, values: &[&str]) -> Result<Vec<String>> {
    values.iter().map(|v| name_arg(what, v)).collect()
}

fn privilege_list(privileges: &[Privilege]) -> Result<Vec<Privilege>> {
    for p in privileges {
        p.validate()?;
    }
    Ok(privileges.to_vec())
}

fn unexpected(command: &str, response: AdminResponse) -> Error {
    Error::client(format!(
        "unexpected response to {}: {:?}",
        command, response
    ))
}

impl Client {
    fn admin(&self, command: AdminCommand, policy: Option<&Value>) -> Result<AdminResponse> {
        let policy: AdminPolicy = resolve(&self.defaults().admin, policy)?;
        debug!(
            target: "aeroclient::admin",
            command = command.name(),
            subject = command.subject().unwrap_or_default(),
            "Dispatching admin command"
        );
        self.cluster()
            .admin(&command, &policy)
            .map_err(|e| match command.subject() {
                Some(subject) => e.with_subject(subject),
                None => e,
            })
    }

    fn admin_ack(&self, command: AdminCommand, policy: Option<&Value>) -> Result<()> {
        let name = command.name();
        match self.admin(command, policy)? {
            AdminResponse::Ack => Ok(()),
            other => Err(unexpected(name, other)),
        }
    }

    /// Create a user with an initial set of roles
    pub fn admin_create_user(
        &self,
        user: &str,
        password: &str,
        roles: &[&str],
        policy: Option<&Value>,
    ) -> Result<()> {
        let command = AdminCommand::CreateUser {
            user: name_arg("user", user)?,
            password: name_arg("password", password)?,
            roles: name_list("role", roles)?,
        };
        self.admin_ack(command, policy)
    }

    /// Remove a user
    pub fn admin_drop_user(&self, user: &str, policy: Option<&Value>) -> Result<()> {
        let command = AdminCommand::DropUser {
            user: name_arg("user", user)?,
        };
        self.admin_ack(command, policy)
    }

    /// Set another user's password
    pub fn admin_set_password(
        &self,
        user: &str,
        password: &str,
        policy: Option<&Value>,
    ) -> Result<()> {
        let command = AdminCommand::SetPassword {
            user: name_arg("user", user)?,
            password: name_arg("password", password)?,
        };
        self.admin_ack(command, policy)
    }

    /// Change the password of the connected user
    pub fn admin_change_password(
        &self,
        user: &str,
        password: &str,
        policy: Option<&Value>,
    ) -> Result<()> {
        let command = AdminCommand::ChangePassword {
            user: name_arg("user", user)?,
            password: name_arg("password", password)?,
        };
        self.admin_ack(command, policy)
    }

    /// Add roles to a user
    pub fn admin_grant_roles(
        &self,
        user: &str,
        roles: &[&str],
        policy: Option<&Value>,
    ) -> Result<()> {
        let command = AdminCommand::GrantRoles {
            user: name_arg("user", user)?,
            roles: name_list("role", roles)?,
        };
        self.admin_ack(command, policy)
    }

    /// Remove roles from a user
    pub fn admin_revoke_roles(
        &self,
        user: &str,
        roles: &[&str],
        policy: Option<&Value>,
    ) -> Result<()> {
        let command = AdminCommand::RevokeRoles {
            user: name_arg("user", user)?,
            roles: name_list("role", roles)?,
        };
        self.admin_ack(command, policy)
    }

    /// Look up one user
    pub fn admin_query_user(&self, user: &str, policy: Option<&Value>) -> Result<UserInfo> {
        let command = AdminCommand::QueryUser {
            user: name_arg("user", user)?,
        };
        match self.admin(command, policy)? {
            AdminResponse::User(info) => Ok(info),
            other => Err(unexpected("query_user", other)),
        }
    }

    /// List every user
    pub fn admin_query_users(&self, policy: Option<&Value>) -> Result<Vec<UserInfo>> {
        match self.admin(AdminCommand::QueryUsers, policy)? {
            AdminResponse::Users(users) => Ok(users),
            other => Err(unexpected("query_users", other)),
        }
    }

    /// Create a role.
    ///
    /// Quotas are records per second and must fit in 32 bits; 0 disables
    /// the limit.
    pub fn admin_create_role(
        &self,
        role: &str,
        privileges: &[Privilege],
        whitelist: &[&str],
        read_quota: i64,
        write_quota: i64,
        policy: Option<&Value>,
    ) -> Result<()> {
        let command = AdminCommand::CreateRole {
            role: name_arg("role", role)?,
            privileges: privilege_list(privileges)?,
            whitelist: name_list("whitelist address", whitelist)?,
            read_quota: check_u32("read_quota", read_quota)?,
            write_quota: check_u32("write_quota", write_quota)?,
        };
        self.admin_ack(command, policy)
    }

    /// Remove a role
    pub fn admin_drop_role(&self, role: &str, policy: Option<&Value>) -> Result<()> {
        let command = AdminCommand::DropRole {
            role: name_arg("role", role)?,
        };
        self.admin_ack(command, policy)
    }

    /// Add privileges to a role
    pub fn admin_grant_privileges(
        &self,
        role: &str,
        privileges: &[Privilege],
        policy: Option<&Value>,
    ) -> Result<()> {
        if privileges.is_empty() {
            return Err(param_error!("privileges cannot be empty"));
        }
        let command = AdminCommand::GrantPrivileges {
            role: name_arg("role", role)?,
            privileges: privilege_list(privileges)?,
        };
        self.admin_ack(command, policy)
    }

    /// Remove privileges from a role
    pub fn admin_revoke_privileges(
        &self,
        role: &str,
        privileges: &[Privilege],
        policy: Option<&Value>,
    ) -> Result<()> {
        if privileges.is_empty() {
            return Err(param_error!("privileges cannot be empty"));
        }
        let command = AdminCommand::RevokePrivileges {
            role: name_arg("role", role)?,
            privileges: privilege_list(privileges)?,
        };
        self.admin_ack(command, policy)
    }

    /// Replace a role's whitelist; an empty list allows every address
    pub fn admin_set_whitelist(
        &self,
        role: &str,
        whitelist: &[&str],
        policy: Option<&Value>,
    ) -> Result<()> {
        let command = AdminCommand::SetWhitelist {
            role: name_arg("role", role)?,
            whitelist: name_list("whitelist address", whitelist)?,
        };
        self.admin_ack(command, policy)
    }

    /// Replace a role's quotas
    pub fn admin_set_quotas(
        &self,
        role: &str,
        read_quota: i64,
        write_quota: i64,
        policy: Option<&Value>,
    ) -> Result<()> {
        let command = AdminCommand::SetQuotas {
            role: name_arg("role", role)?,
            read_quota: check_u32("read_quota", read_quota)?,
            write_quota: check_u32("write_quota", write_quota)?,
        };
        self.admin_ack(command, policy)
    }

    /// Look up one role
    pub fn admin_query_role(&self, role: &str, policy: Option<&Value>) -> Result<RoleInfo> {
        let command = AdminCommand::QueryRole {
            role: name_arg("role", role)?,
        };
        match self.admin(command, policy)? {
            AdminResponse::Role(info) => Ok(info),
            other => Err(unexpected("query_role", other)),
        }
    }

    /// List every role
    pub fn admin_query_roles(&self, policy: Option<&Value>) -> Result<Vec<RoleInfo>> {
        match self.admin(AdminCommand::QueryRoles, policy)? {
            AdminResponse::Roles(roles) => Ok(roles),
            other => Err(unexpected("query_roles", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeroclient_core::{ErrorKind, ResultCode};

    fn client() -> Client {
        Client::in_memory()
    }

    #[test]
    fn test_privilege_decode() {
        let v = Value::map_from([
            ("code", Value::Int(10)),
            ("ns", Value::from("test")),
            ("set", Value::from("demo")),
        ]);
        let p = Privilege::decode(&v).unwrap();
        assert_eq!(p, Privilege::scoped(PrivilegeCode::Read, "test", Some("demo")));

        let bad = Value::map_from([("code", Value::Int(99))]);
        assert!(Privilege::decode(&bad).unwrap_err().is_param());
        let orphan_set = Value::map_from([("code", Value::Int(10)), ("set", Value::from("demo"))]);
        assert!(Privilege::decode(&orphan_set).is_err());
        let scoped_global = Value::map_from([("code", Value::Int(0)), ("ns", Value::from("test"))]);
        assert!(Privilege::decode(&scoped_global).is_err());
    }

    #[test]
    fn test_quota_must_fit_u32() {
        let c = client();
        let err = c
            .admin_create_role("r", &[], &[], 1 << 40, 0, None)
            .unwrap_err();
        assert_eq!(err.code(), ResultCode::ParamError);
        let err = c.admin_set_quotas("r", 0, -1, None).unwrap_err();
        assert!(err.is_param());
    }

    #[test]
    fn test_role_lifecycle() {
        let c = client();
        let read = Privilege::scoped(PrivilegeCode::Read, "test", None);
        c.admin_create_role("reader", &[read.clone()], &["10.0.0.1"], 100, 0, None)
            .unwrap();
        let role = c.admin_query_role("reader", None).unwrap();
        assert_eq!(role.privileges, vec![read]);
        assert_eq!(role.read_quota, 100);

        c.admin_set_quotas("reader", 5, 6, None).unwrap();
        let role = c.admin_query_role("reader", None).unwrap();
        assert_eq!((role.read_quota, role.write_quota), (5, 6));

        let err = c
            .admin_create_role("reader", &[], &[], 0, 0, None)
            .unwrap_err();
        assert_eq!(err.code(), ResultCode::RoleAlreadyExists);
        assert_eq!(err.subject(), Some("reader"));

        c.admin_drop_role("reader", None).unwrap();
        let err = c.admin_query_role("reader", None).unwrap_err();
        assert_eq!(err.code(), ResultCode::InvalidRole);
        assert_eq!(err.kind(), ErrorKind::Admin);
    }

    #[test]
    fn test_user_lifecycle() {
        let c = client();
        let sys_admin = [Privilege::global(PrivilegeCode::SysAdmin)];
        c.admin_create_role("writer", &sys_admin, &[], 0, 0, None)
            .unwrap();
        c.admin_create_user("ann", "secret", &["writer"], None).unwrap();
        assert_eq!(
            c.admin_query_user("ann", None).unwrap().roles,
            vec!["writer".to_string()]
        );
        c.admin_revoke_roles("ann", &["writer"], None).unwrap();
        assert!(c.admin_query_user("ann", None).unwrap().roles.is_empty());

        let err = c
            .admin_grant_roles("ann", &["missing"], None)
            .unwrap_err();
        assert_eq!(err.code(), ResultCode::InvalidRole);

        let err = c.admin_drop_user("nobody", None).unwrap_err();
        assert_eq!(err.code(), ResultCode::InvalidUser);
        assert_eq!(err.subject(), Some("nobody"));
    }

    #[test]
    fn test_empty_names_rejected_locally() {
        let c = client();
        assert!(c.admin_create_user("", "pw", &[], None).unwrap_err().is_param());
        assert!(c.admin_create_user("u", "", &[], None).unwrap_err().is_param());
        assert!(c.admin_grant_privileges("r", &[], None).unwrap_err().is_param());
    }
}
