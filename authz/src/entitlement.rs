//! The closed set of permission verbs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A string that is not a known entitlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEntitlement(pub String);

impl fmt::Display for UnknownEntitlement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown entitlement {:?}", self.0)
    }
}

impl std::error::Error for UnknownEntitlement {}

macro_rules! entitlements {
    ($( $(#[$doc:meta])* $variant:ident => $name:literal, )+) => {
        /// A permission as it applies to a particular object type.
        ///
        /// Which (object type, entitlement) pairs make sense is decided by the
        /// drivers, not here.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum Entitlement {
            $(
                $(#[$doc])*
                #[serde(rename = $name)]
                $variant,
            )+
        }

        impl Entitlement {
            /// Every entitlement.
            pub const ALL: &'static [Entitlement] = &[$(Entitlement::$variant,)+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Entitlement::$variant => $name,)+
                }
            }
        }

        impl FromStr for Entitlement {
            type Err = UnknownEntitlement;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Entitlement::$variant),)+
                    other => Err(UnknownEntitlement(other.to_string())),
                }
            }
        }
    };
}

entitlements! {
    // All resources.
    CanEdit => "can_edit",
    CanView => "can_view",

    // Server.
    CanCreateCertificates => "can_create_certificates",
    CanCreateNetworkIntegrations => "can_create_network_integrations",
    CanCreateProjects => "can_create_projects",
    CanCreateStoragePools => "can_create_storage_pools",
    CanOverrideClusterTargetRestriction => "can_override_cluster_target_restriction",
    CanViewMetrics => "can_view_metrics",
    CanViewPrivilegedEvents => "can_view_privileged_events",
    CanViewResources => "can_view_resources",

    // Project.
    CanCreateImageAliases => "can_create_image_aliases",
    CanCreateImages => "can_create_images",
    CanCreateInstances => "can_create_instances",
    CanCreateNetworkAcls => "can_create_network_acls",
    CanCreateNetworks => "can_create_networks",
    CanCreateNetworkZones => "can_create_network_zones",
    CanCreateProfiles => "can_create_profiles",
    CanCreateStorageBuckets => "can_create_storage_buckets",
    CanCreateStorageVolumes => "can_create_storage_volumes",
    CanViewEvents => "can_view_events",
    CanViewOperations => "can_view_operations",

    // Instance.
    CanAccessConsole => "can_access_console",
    CanAccessFiles => "can_access_files",
    CanConnectSftp => "can_connect_sftp",
    CanExec => "can_exec",
    CanUpdateState => "can_update_state",

    // Instance and storage volume.
    CanManageBackups => "can_manage_backups",
    CanManageSnapshots => "can_manage_snapshots",
}

impl Entitlement {
    /// Entitlements a project-restricted certificate keeps on the server object.
    pub fn is_server_view(&self) -> bool {
        matches!(
            self,
            Entitlement::CanView | Entitlement::CanViewResources | Entitlement::CanViewMetrics
        )
    }
}

impl fmt::Display for Entitlement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
