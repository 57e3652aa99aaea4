//! Per-RPC credentials for gRPC channels.
//!
//! The adapter is transport agnostic: it yields the metadata map a gRPC stack attaches to
//! each call, so it plugs into interceptors of any client library.

// self
use crate::{_prelude::*, context::TokenContext, source::TokenSource};

/// Metadata key carrying the token.
pub const AUTHORIZATION_METADATA_KEY: &str = "authorization";

/// Per-RPC credentials backed by a [`TokenSource`].
///
/// Calls reach the source directly; pass a caching source to avoid an exchange per RPC.
#[derive(Clone)]
pub struct PerRpcCredentials {
	source: Arc<dyn TokenSource>,
}
impl PerRpcCredentials {
	/// Creates credentials fetching tokens from `source`.
	pub fn new(source: Arc<dyn TokenSource>) -> Self {
		Self { source }
	}

	/// Returns `{"authorization": "<type> <token>"}` for one call.
	///
	/// `_uris` identifies the target service; tokens are not audience-bound, so it is ignored.
	pub async fn request_metadata(
		&self,
		ctx: &TokenContext,
		_uris: &[&str],
	) -> Result<HashMap<String, String>> {
		let record = self.source.token(ctx).await?;

		Ok(HashMap::from([(AUTHORIZATION_METADATA_KEY.to_owned(), record.authorization_value())]))
	}

	/// Tokens are bearer credentials and must only travel over a secure transport.
	pub fn require_transport_security(&self) -> bool {
		true
	}
}
impl Debug for PerRpcCredentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PerRpcCredentials").finish_non_exhaustive()
	}
}
