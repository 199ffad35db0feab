//! Canonical label and annotation keys. These are the only coordinates hub
//! and spoke controllers are allowed to use to recognize "their" resources --
//! cross-namespace and cross-cluster owner references do not exist in
//! Kubernetes, so this label convention is the substitute.

pub const MANAGED_BY: &str = "ovim.io/managed-by";
pub const MANAGED_BY_HUB: &str = "hub-controller";
pub const MANAGED_BY_SPOKE: &str = "spoke-agent";

pub const APP_NAME: &str = "app.kubernetes.io/name";
pub const APP_NAME_VALUE: &str = "ovim";

pub const LABEL_TYPE: &str = "type";
pub const LABEL_ORG: &str = "org";
pub const LABEL_VDC: &str = "vdc";

pub const VDC_ID: &str = "ovim.io/vdc-id";
pub const VDC_NAMESPACE: &str = "ovim.io/vdc-namespace";
pub const CLUSTER_ID: &str = "ovim.io/cluster-id";

pub const ORG_FINALIZER: &str = "ovim.io/org-finalizer";
pub const VDC_FINALIZER: &str = "ovim.io/vdc-finalizer";
pub const SPOKE_VDC_FINALIZER: &str = "spokevdc.ovim.io/finalizer";

pub const HUB_DELETE_REQUESTED: &str = "ovim.io/hub-delete-requested";
pub const DELETION_INITIATED_BY: &str = "ovim.io/deletion-initiated-by";
pub const DELETION_INITIATED_AT: &str = "ovim.io/deletion-initiated-at";

pub const DELETION_STATUS: &str = "ovim.io/deletion-status";
pub const DELETION_STATUS_PENDING: &str = "pending";
pub const DELETED_AT: &str = "ovim.io/deleted-at";
pub const DELETED_BY: &str = "ovim.io/deleted-by";

pub const SPEC_HASH: &str = "ovim.io/spec-hash";
pub const CREATED_BY: &str = "ovim.io/created-by";

pub const TYPE_ORG_ADMIN: &str = "org-admin";
pub const TYPE_VDC_ADMIN: &str = "vdc-admin";
pub const TYPE_VDC_QUOTA: &str = "vdc-quota";
pub const TYPE_VDC_LIMITS: &str = "vdc-limits";
pub const TYPE_VDC_NETWORK_POLICY: &str = "vdc-network-policy";
