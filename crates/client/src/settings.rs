//! Effective policy → per-record command settings

use crate::transport::CommandSettings;
use aeroclient_operations::Expiration;
use aeroclient_policy::{
    ApplyPolicy, BasePolicy, BatchApplyPolicy, BatchPolicy, BatchReadPolicy, BatchRemovePolicy,
    BatchWritePolicy, OperatePolicy, ReadPolicy, RemovePolicy, Replica, WritePolicy,
};

impl From<&ReadPolicy> for CommandSettings {
    fn from(p: &ReadPolicy) -> Self {
        CommandSettings {
            filter: p.base.filter.clone(),
            replica: p.replica,
            read_mode_ap: p.read_mode_ap,
            read_mode_sc: p.read_mode_sc,
            socket_timeout: p.base.socket_timeout,
            ..Default::default()
        }
        .key_policy(p.key)
    }
}

impl From<&WritePolicy> for CommandSettings {
    fn from(p: &WritePolicy) -> Self {
        CommandSettings {
            filter: p.base.filter.clone(),
            replica: p.replica,
            commit_level: p.commit_level,
            gen: p.gen,
            exists: p.exists,
            durable_delete: p.durable_delete,
            socket_timeout: p.base.socket_timeout,
            ..Default::default()
        }
        .key_policy(p.key)
    }
}

impl From<&OperatePolicy> for CommandSettings {
    fn from(p: &OperatePolicy) -> Self {
        CommandSettings {
            filter: p.base.filter.clone(),
            replica: p.replica,
            read_mode_ap: p.read_mode_ap,
            read_mode_sc: p.read_mode_sc,
            commit_level: p.commit_level,
            gen: p.gen,
            exists: p.exists,
            durable_delete: p.durable_delete,
            respond_all_ops: p.respond_all_ops,
            socket_timeout: p.base.socket_timeout,
            ..Default::default()
        }
        .key_policy(p.key)
    }
}

impl From<&ApplyPolicy> for CommandSettings {
    fn from(p: &ApplyPolicy) -> Self {
        CommandSettings {
            filter: p.base.filter.clone(),
            replica: p.replica,
            commit_level: p.commit_level,
            durable_delete: p.durable_delete,
            ttl: Expiration::from_wire(p.ttl),
            socket_timeout: p.base.socket_timeout,
            ..Default::default()
        }
        .key_policy(p.key)
    }
}

impl From<&RemovePolicy> for CommandSettings {
    fn from(p: &RemovePolicy) -> Self {
        CommandSettings {
            filter: p.base.filter.clone(),
            replica: p.replica,
            commit_level: p.commit_level,
            gen: p.gen,
            durable_delete: p.durable_delete,
            socket_timeout: p.base.socket_timeout,
            ..Default::default()
        }
        .key_policy(p.key)
    }
}

/// Batch sub-policies inherit the parent batch's transport settings and
/// fall back to its filter when they carry none.
pub(crate) fn batch_read(parent: &BatchPolicy, p: &BatchReadPolicy) -> CommandSettings {
    CommandSettings {
        filter: p.filter.clone().or_else(|| parent.base.filter.clone()),
        replica: parent.replica,
        read_mode_ap: p.read_mode_ap,
        read_mode_sc: p.read_mode_sc,
        socket_timeout: parent.base.socket_timeout,
        ..Default::default()
    }
}

pub(crate) fn batch_write(parent: &BatchPolicy, p: &BatchWritePolicy) -> CommandSettings {
    CommandSettings {
        filter: p.filter.clone().or_else(|| parent.base.filter.clone()),
        replica: parent.replica,
        commit_level: p.commit_level,
        gen: p.gen,
        exists: p.exists,
        durable_delete: p.durable_delete,
        respond_all_ops: true,
        socket_timeout: parent.base.socket_timeout,
        ..Default::default()
    }
    .key_policy(p.key)
}

pub(crate) fn batch_apply(parent: &BatchPolicy, p: &BatchApplyPolicy) -> CommandSettings {
    CommandSettings {
        filter: p.filter.clone().or_else(|| parent.base.filter.clone()),
        replica: parent.replica,
        commit_level: p.commit_level,
        durable_delete: p.durable_delete,
        ttl: Expiration::from_wire(p.ttl),
        socket_timeout: parent.base.socket_timeout,
        ..Default::default()
    }
    .key_policy(p.key)
}

pub(crate) fn batch_remove(parent: &BatchPolicy, p: &BatchRemovePolicy) -> CommandSettings {
    CommandSettings {
        filter: p.filter.clone().or_else(|| parent.base.filter.clone()),
        replica: parent.replica,
        commit_level: p.commit_level,
        gen: p.gen,
        durable_delete: p.durable_delete,
        socket_timeout: parent.base.socket_timeout,
        ..Default::default()
    }
    .key_policy(p.key)
}

/// Writes of a background job. The record filter travels on the stream
/// request, and UDF writes keep each record's expiration.
pub(crate) fn background(
    base: &BasePolicy,
    replica: Replica,
    durable_delete: bool,
) -> CommandSettings {
    CommandSettings {
        replica,
        durable_delete,
        ttl: Expiration::DontUpdate,
        socket_timeout: base.socket_timeout,
        ..Default::default()
    }
}
