//! Wallet connection adapter
//!
//! `WalletProvider` is the injected wallet (a browser extension, a hardware
//! signer, a local key). `WalletSession` wraps an optional provider and keeps
//! the connected address, a `connecting` flag and the last error, and
//! broadcasts connect/disconnect notifications.

use crate::{constants::EVENT_CHANNEL_CAPACITY, error::WalletError};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// True when the wallet is installed and usable
    fn is_available(&self) -> bool;

    /// Requests a connection and returns the wallet address
    async fn connect(&self) -> Result<String, WalletError>;

    async fn disconnect(&self) -> Result<(), WalletError>;

    /// Address of an already-established connection, if any
    fn current_address(&self) -> Option<String>;
}

/// Connected wallet as shown to consumers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WalletInfo {
    pub address: String,
    pub connected: bool,
}

impl WalletInfo {
    fn connected(address: String) -> Self {
        Self {
            address,
            connected: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    Connected { address: String },
    Disconnected,
}

#[derive(Debug, Default)]
struct SessionState {
    wallet: WalletInfo,
    connecting: bool,
    error: Option<String>,
}

pub struct WalletSession {
    provider: Option<Arc<dyn WalletProvider>>,
    state: Mutex<SessionState>,
    events: broadcast::Sender<WalletEvent>,
}

impl WalletSession {
    /// Creates a session, picking up a connection the provider already has
    pub fn new(provider: Option<Arc<dyn WalletProvider>>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let session = Self {
            provider,
            state: Mutex::new(SessionState::default()),
            events,
        };
        session.sync_with_provider();
        session
    }

    pub fn is_wallet_installed(&self) -> bool {
        self.provider.as_ref().is_some_and(|p| p.is_available())
    }

    pub async fn connect(&self) -> Result<String, WalletError> {
        let provider = match self.provider.as_ref().filter(|p| p.is_available()) {
            Some(provider) => provider.clone(),
            None => {
                let err = WalletError::NotFound;
                self.state.lock().error = Some(err.to_string());
                return Err(err);
            }
        };

        {
            let mut state = self.state.lock();
            state.connecting = true;
            state.error = None;
        }

        let result = provider.connect().await;

        let mut state = self.state.lock();
        state.connecting = false;
        match result {
            Ok(address) => {
                info!(address = %address, "Wallet connected");
                state.wallet = WalletInfo::connected(address.clone());
                drop(state);
                let _ = self.events.send(WalletEvent::Connected {
                    address: address.clone(),
                });
                Ok(address)
            }
            Err(e) => {
                warn!(error = %e, "Wallet connection failed");
                state.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    pub async fn disconnect(&self) -> Result<(), WalletError> {
        if let Some(provider) = self.provider.clone() {
            if let Err(e) = provider.disconnect().await {
                self.state.lock().error = Some(e.to_string());
                return Err(e);
            }
        }

        {
            let mut state = self.state.lock();
            state.wallet = WalletInfo::default();
            state.error = None;
        }
        info!("Wallet disconnected");
        let _ = self.events.send(WalletEvent::Disconnected);
        Ok(())
    }

    /// Handles a "connect" notification raised by the provider itself
    pub fn on_provider_connect(&self) {
        if self.sync_with_provider() {
            if let Some(address) = self.current_address() {
                let _ = self.events.send(WalletEvent::Connected { address });
            }
        }
    }

    /// Handles a "disconnect" notification raised by the provider itself
    pub fn on_provider_disconnect(&self) {
        self.state.lock().wallet = WalletInfo::default();
        let _ = self.events.send(WalletEvent::Disconnected);
    }

    /// Copies the provider's existing connection into the session.
    /// Returns true if a connected address was found.
    fn sync_with_provider(&self) -> bool {
        let address = self
            .provider
            .as_ref()
            .filter(|p| p.is_available())
            .and_then(|p| p.current_address());

        match address {
            Some(address) => {
                debug!(address = %address, "Found existing wallet connection");
                self.state.lock().wallet = WalletInfo::connected(address);
                true
            }
            None => false,
        }
    }

    pub fn current_address(&self) -> Option<String> {
        let state = self.state.lock();
        state
            .wallet
            .connected
            .then(|| state.wallet.address.clone())
    }

    pub fn wallet(&self) -> WalletInfo {
        self.state.lock().wallet.clone()
    }

    pub fn connecting(&self) -> bool {
        self.state.lock().connecting
    }

    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }
}

/// Watch-only wallet backed by a fixed Solana public key
pub struct PubkeyWallet {
    pubkey: Pubkey,
    connected: Mutex<bool>,
}

impl PubkeyWallet {
    pub fn new(pubkey: Pubkey) -> Self {
        Self {
            pubkey,
            connected: Mutex::new(false),
        }
    }

    /// Parses a base58 address
    pub fn from_address(address: &str) -> Result<Self, WalletError> {
        Pubkey::from_str(address)
            .map(Self::new)
            .map_err(|e| WalletError::Rejected(format!("invalid address {}: {}", address, e)))
    }

    pub fn pubkey(&self) -> Pubkey {
        self.pubkey
    }
}

#[async_trait]
impl WalletProvider for PubkeyWallet {
    fn is_available(&self) -> bool {
        true
    }

    async fn connect(&self) -> Result<String, WalletError> {
        *self.connected.lock() = true;
        Ok(self.pubkey.to_string())
    }

    async fn disconnect(&self) -> Result<(), WalletError> {
        *self.connected.lock() = false;
        Ok(())
    }

    fn current_address(&self) -> Option<String> {
        let connected = *self.connected.lock();
        connected.then(|| self.pubkey.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RejectingWallet;

    #[async_trait]
    impl WalletProvider for RejectingWallet {
        fn is_available(&self) -> bool {
            true
        }

        async fn connect(&self) -> Result<String, WalletError> {
            Err(WalletError::Rejected("User rejected the request".to_string()))
        }

        async fn disconnect(&self) -> Result<(), WalletError> {
            Ok(())
        }

        fn current_address(&self) -> Option<String> {
            None
        }
    }

    #[tokio::test]
    async fn test_missing_provider_reports_not_found() {
        let session = WalletSession::new(None);

        assert!(!session.is_wallet_installed());
        assert_eq!(session.connect().await, Err(WalletError::NotFound));
        assert!(session.error().unwrap().contains("not found"));
        assert!(!session.wallet().connected);
    }

    #[tokio::test]
    async fn test_connect_and_disconnect() {
        let pubkey = Pubkey::new_unique();
        let session = WalletSession::new(Some(Arc::new(PubkeyWallet::new(pubkey))));
        let mut events = session.subscribe();

        assert!(session.current_address().is_none());
        let address = session.connect().await.unwrap();
        assert_eq!(address, pubkey.to_string());
        assert_eq!(session.current_address(), Some(address.clone()));
        assert!(!session.connecting());

        session.disconnect().await.unwrap();
        assert_eq!(session.wallet(), WalletInfo::default());

        assert_eq!(
            events.try_recv().unwrap(),
            WalletEvent::Connected { address }
        );
        assert_eq!(events.try_recv().unwrap(), WalletEvent::Disconnected);
    }

    #[tokio::test]
    async fn test_existing_connection_is_picked_up() {
        let wallet = Arc::new(PubkeyWallet::new(Pubkey::new_unique()));
        wallet.connect().await.unwrap();

        let session = WalletSession::new(Some(wallet.clone()));
        assert!(session.wallet().connected);

        session.on_provider_disconnect();
        assert!(session.current_address().is_none());

        session.on_provider_connect();
        assert_eq!(
            session.current_address(),
            Some(wallet.pubkey().to_string())
        );
    }

    #[tokio::test]
    async fn test_rejected_connection_sets_error() {
        let session = WalletSession::new(Some(Arc::new(RejectingWallet)));

        assert!(session.connect().await.is_err());
        assert!(session.error().unwrap().contains("rejected"));
        assert!(!session.connecting());
        assert!(!session.wallet().connected);
    }

    #[test]
    fn test_from_address_validates() {
        assert!(PubkeyWallet::from_address(crate::constants::SOL_ADDRESS).is_ok());
        assert!(PubkeyWallet::from_address("nope").is_err());
    }
}
