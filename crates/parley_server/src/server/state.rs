#![forbid(unsafe_code)]

use parley_domain::SecretString;
use parley_store::Store;

use crate::server::chats::ChatService;
use crate::server::health::HealthState;
use crate::server::messages::MessageService;
use crate::server::notify::Dispatcher;
use crate::server::registry::GroupRegistry;

/// Shared handles threaded through every route. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
	pub store: Store,
	pub registry: GroupRegistry,
	pub chats: ChatService,
	pub messages: MessageService,
	pub notifier: Dispatcher,
	pub auth_hmac_secret: Option<SecretString>,
	pub health: HealthState,
	pub page_size: u32,
}
