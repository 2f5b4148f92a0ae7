//! OAuth 2.0 device authorization: the provider client and the background
//! poller that settles each sign-in.

mod client;
mod poller;

pub use client::{
    DeviceCode, DeviceFlowProvider, GithubClient, OAuthEndpoints, ProviderIdentity, TokenPoll,
};
pub use poller::{DevicePoller, PollOutcome};
