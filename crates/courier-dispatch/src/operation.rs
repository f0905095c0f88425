//! Static table of logical service operations.
//!
//! Each [`Operation`] maps to a relative path on the home service and a flag
//! saying whether it may travel over the multiplexed transport.

use std::fmt;
use std::str::FromStr;

use crate::error::DispatchError;

/// A logical call against the home service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `v1/accounts`
    Accounts,
    /// `v1/accounts/account`
    AccountExistence,
    /// `v2/attachments/form/upload`
    AttachmentId,
    /// `v1/attestation`
    Attestation,
    /// `v1/profile/identity_check/batch`
    BatchIdentityCheck,
    /// `v1/subscription/boost/badges`
    BoostBadges,
    /// `v1/challenge`
    Challenge,
    /// `v1/config`
    Config,
    /// `v1/certificate/delivery`
    DeliveryCert,
    /// `v1/devices`
    Devices,
    /// `v1/directory/auth`
    DirectoryAuth,
    /// `v2/directory/auth`
    DirectoryAuthV2,
    /// `v1/discovery`
    Discovery,
    /// `v1/groups/avatar/form`
    GetGroupAvatarUpload,
    /// `v1/certificate/auth/group`
    GetGroupCredentials,
    /// `v1/accounts/turn`
    GetIceServers,
    /// `dynamic/desktop/stories/onboarding/manifest.json`
    GetOnboardingStoryManifest,
    /// `v1/sticker/pack/form`
    GetStickerPackUpload,
    /// `v1/groups/logs`
    GroupLog,
    /// `v1/groups/joined_at_version`
    GroupJoinedAtVersion,
    /// `v1/groups`
    Groups,
    /// `v1/groups/join/`
    GroupsViaLink,
    /// `v1/groups/token`
    GroupToken,
    /// `v2/keys`
    Keys,
    /// `v1/messages`
    Messages,
    /// `v1/messages/multi_recipient`
    MultiRecipient,
    /// `v1/profile`
    Profile,
    /// `v1/devices/capabilities`
    RegisterCapabilities,
    /// `v1/messages/report`
    ReportMessage,
    /// `v2/keys/signed`
    Signed,
    /// `v1/storage/manifest`
    StorageManifest,
    /// `v1/storage/`
    StorageModify,
    /// `v1/storage/read`
    StorageRead,
    /// `v1/storage/auth`
    StorageToken,
    /// `v1/subscription`
    Subscriptions,
    /// `v1/devices/unauthenticated_delivery`
    SupportUnauthenticatedDelivery,
    /// `v1/accounts/name`
    UpdateDeviceName,
    /// `v1/accounts/username`
    Username,
    /// `v1/accounts/username/reserved`
    ReservedUsername,
    /// `v1/accounts/username/confirm`
    ConfirmUsername,
    /// `v1/accounts/whoami`
    Whoami,
}

/// Immutable routing record for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationEntry {
    /// Call name as used in logs and on the command line.
    pub name: &'static str,
    /// Path relative to the service base URL.
    pub path: &'static str,
    /// Whether the call may use the multiplexed transport.
    pub multiplexable: bool,
}

const fn entry(name: &'static str, path: &'static str, multiplexable: bool) -> OperationEntry {
    OperationEntry {
        name,
        path,
        multiplexable,
    }
}

impl Operation {
    /// Every operation, in table order.
    pub const ALL: [Operation; 41] = [
        Operation::Accounts,
        Operation::AccountExistence,
        Operation::AttachmentId,
        Operation::Attestation,
        Operation::BatchIdentityCheck,
        Operation::BoostBadges,
        Operation::Challenge,
        Operation::Config,
        Operation::DeliveryCert,
        Operation::Devices,
        Operation::DirectoryAuth,
        Operation::DirectoryAuthV2,
        Operation::Discovery,
        Operation::GetGroupAvatarUpload,
        Operation::GetGroupCredentials,
        Operation::GetIceServers,
        Operation::GetOnboardingStoryManifest,
        Operation::GetStickerPackUpload,
        Operation::GroupLog,
        Operation::GroupJoinedAtVersion,
        Operation::Groups,
        Operation::GroupsViaLink,
        Operation::GroupToken,
        Operation::Keys,
        Operation::Messages,
        Operation::MultiRecipient,
        Operation::Profile,
        Operation::RegisterCapabilities,
        Operation::ReportMessage,
        Operation::Signed,
        Operation::StorageManifest,
        Operation::StorageModify,
        Operation::StorageRead,
        Operation::StorageToken,
        Operation::Subscriptions,
        Operation::SupportUnauthenticatedDelivery,
        Operation::UpdateDeviceName,
        Operation::Username,
        Operation::ReservedUsername,
        Operation::ConfirmUsername,
        Operation::Whoami,
    ];

    /// Routing record for this operation.
    pub const fn entry(self) -> OperationEntry {
        match self {
            Operation::Accounts => entry("accounts", "v1/accounts", false),
            Operation::AccountExistence => entry("accountExistence", "v1/accounts/account", false),
            Operation::AttachmentId => entry("attachmentId", "v2/attachments/form/upload", true),
            Operation::Attestation => entry("attestation", "v1/attestation", false),
            Operation::BatchIdentityCheck => {
                entry("batchIdentityCheck", "v1/profile/identity_check/batch", false)
            }
            Operation::BoostBadges => entry("boostBadges", "v1/subscription/boost/badges", false),
            Operation::Challenge => entry("challenge", "v1/challenge", false),
            Operation::Config => entry("config", "v1/config", true),
            Operation::DeliveryCert => entry("deliveryCert", "v1/certificate/delivery", true),
            Operation::Devices => entry("devices", "v1/devices", true),
            Operation::DirectoryAuth => entry("directoryAuth", "v1/directory/auth", true),
            Operation::DirectoryAuthV2 => entry("directoryAuthV2", "v2/directory/auth", true),
            Operation::Discovery => entry("discovery", "v1/discovery", false),
            Operation::GetGroupAvatarUpload => {
                entry("getGroupAvatarUpload", "v1/groups/avatar/form", false)
            }
            Operation::GetGroupCredentials => {
                entry("getGroupCredentials", "v1/certificate/auth/group", true)
            }
            Operation::GetIceServers => entry("getIceServers", "v1/accounts/turn", false),
            Operation::GetOnboardingStoryManifest => entry(
                "getOnboardingStoryManifest",
                "dynamic/desktop/stories/onboarding/manifest.json",
                false,
            ),
            Operation::GetStickerPackUpload => {
                entry("getStickerPackUpload", "v1/sticker/pack/form", false)
            }
            Operation::GroupLog => entry("groupLog", "v1/groups/logs", false),
            Operation::GroupJoinedAtVersion => {
                entry("groupJoinedAtVersion", "v1/groups/joined_at_version", false)
            }
            Operation::Groups => entry("groups", "v1/groups", false),
            Operation::GroupsViaLink => entry("groupsViaLink", "v1/groups/join/", false),
            Operation::GroupToken => entry("groupToken", "v1/groups/token", false),
            Operation::Keys => entry("keys", "v2/keys", false),
            Operation::Messages => entry("messages", "v1/messages", true),
            Operation::MultiRecipient => entry("multiRecipient", "v1/messages/multi_recipient", true),
            Operation::Profile => entry("profile", "v1/profile", true),
            Operation::RegisterCapabilities => {
                entry("registerCapabilities", "v1/devices/capabilities", true)
            }
            Operation::ReportMessage => entry("reportMessage", "v1/messages/report", true),
            Operation::Signed => entry("signed", "v2/keys/signed", false),
            Operation::StorageManifest => entry("storageManifest", "v1/storage/manifest", false),
            Operation::StorageModify => entry("storageModify", "v1/storage/", false),
            Operation::StorageRead => entry("storageRead", "v1/storage/read", false),
            Operation::StorageToken => entry("storageToken", "v1/storage/auth", true),
            Operation::Subscriptions => entry("subscriptions", "v1/subscription", false),
            Operation::SupportUnauthenticatedDelivery => entry(
                "supportUnauthenticatedDelivery",
                "v1/devices/unauthenticated_delivery",
                true,
            ),
            Operation::UpdateDeviceName => entry("updateDeviceName", "v1/accounts/name", false),
            Operation::Username => entry("username", "v1/accounts/username", false),
            Operation::ReservedUsername => {
                entry("reservedUsername", "v1/accounts/username/reserved", false)
            }
            Operation::ConfirmUsername => {
                entry("confirmUsername", "v1/accounts/username/confirm", false)
            }
            Operation::Whoami => entry("whoami", "v1/accounts/whoami", false),
        }
    }

    /// Relative path of this operation.
    pub const fn path(self) -> &'static str {
        self.entry().path
    }

    /// Call name of this operation.
    pub const fn name(self) -> &'static str {
        self.entry().name
    }

    /// Whether this operation may use the multiplexed transport.
    pub const fn is_multiplexable(self) -> bool {
        self.entry().multiplexable
    }

    /// Served by the storage service rather than the home service.
    pub const fn is_storage_service(self) -> bool {
        matches!(
            self,
            Operation::StorageManifest | Operation::StorageModify | Operation::StorageRead
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operation {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .iter()
            .copied()
            .find(|op| op.name() == s)
            .ok_or_else(|| DispatchError::UnknownOperation(s.to_string()))
    }
}
