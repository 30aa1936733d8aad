pub mod config;
pub mod event;
pub mod issue;
pub mod payload;
pub mod search;

pub use config::{
    Config, GitHubConfig, ListenerConfig, LogFormat, LoggingConfig, RotationPolicy,
    SearcherConfig, SyncConfig,
};
pub use event::{ClassifiedEvent, EventKind, EventSelector, TagSet};
pub use issue::{Issue, IssueKind, IssueRef, IssueState, PromotedLink, Repository, User};
pub use payload::{
    AccountPayload, CommentPayload, IssuePayload, LabelPayload, ProviderItem, RepositoryPayload,
    TextMatch, WebhookDelivery,
};
pub use search::{Predicate, SearchPage, SearchQuery};
