//! # Retriable Operation Kinds
//!
//! Concrete [`RetriableOperation`](crate::resilience::RetriableOperation)s
//! the agent drives from its polling loop:
//!
//! - [`EnrollmentOperation`]: enrollment status request/response
//! - [`RootKeyRefreshOperation`]: root key package refresh
//! - [`TopicSubscribeOperation`]: broker topic subscriptions
//!
//! Each talks to the cloud only through the narrow traits in [`channel`]
//! and turns every [`TransportError`](crate::orchestration::TransportError)
//! into a [`FailureClass`](crate::resilience::FailureClass) via a
//! [`FailureClassifier`](crate::orchestration::FailureClassifier).

pub mod channel;
pub mod enrollment;
pub mod request_tracker;
pub mod root_key_refresh;
pub mod topic_subscribe;

pub use channel::{shared_channel, CloudChannel, OutboundRequest, SharedChannel};
pub use enrollment::{EnrollmentOperation, EnrollmentState};
pub use request_tracker::{InFlightRequest, RequestTracker};
pub use root_key_refresh::{
    FileRootKeyStore, RootKeyPackageSource, RootKeyPackageVersion, RootKeyRefreshOperation,
    RootKeyRefreshOutcome, RootKeyStore, RootKeyStoreError,
};
pub use topic_subscribe::TopicSubscribeOperation;
