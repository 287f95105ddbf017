// Handshake Protocol - Syn, KeyExchange, Auth
//
// 1. Syn: send our name, public key and port; learn the master's public key,
//    our migration priority and our client identifier.
// 2. KeyExchange: seal our channel key for the master; open the master's
//    channel key sealed for us.
// 3. Auth: send {secret, clientIdentifier} under the master's channel key;
//    receive the session token under ours.
//
// Any failure aborts the attempt. Nothing is retried here.

use crate::crypto::{decode_base64, encode_base64, seal, ChannelKey, Keypair};
use crate::handshake::{HandshakeError, HandshakeState, Session, StateCell};
use crate::protocol::{AuthAck, AuthGrant, AuthRequest, AuthSealed, AuthSyn, KeyExchange};
use crate::transport::{Auth, MasterLink};

/// Identity and credentials presented to the master
#[derive(Clone, Debug)]
pub struct HandshakeParams {
    pub client_name: String,
    pub port: u16,
    pub secret: String,
}

/// One handshake attempt
pub struct Handshake<'a> {
    link: &'a MasterLink,
    params: &'a HandshakeParams,
    state: StateCell,
}

impl<'a> Handshake<'a> {
    pub fn new(link: &'a MasterLink, params: &'a HandshakeParams, state: StateCell) -> Self {
        Self {
            link,
            params,
            state,
        }
    }

    /// Current phase
    pub fn state(&self) -> HandshakeState {
        self.state.read().clone()
    }

    /// Run all three phases, leaving the state Authenticated or Failed
    pub async fn run(&self) -> Result<Session, HandshakeError> {
        match self.phases().await {
            Ok(session) => {
                self.transition(HandshakeState::Authenticated)?;
                Ok(session)
            }
            Err(error) => {
                let mut state = self.state.write();
                if state.is_in_progress() {
                    *state = HandshakeState::Failed(error.to_string());
                }
                Err(error)
            }
        }
    }

    fn transition(&self, to: HandshakeState) -> Result<(), HandshakeError> {
        let mut state = self.state.write();
        if !state.can_transition_to(&to) {
            return Err(HandshakeError::OutOfSequence {
                from: state.clone(),
                to,
            });
        }
        tracing::debug!(from = ?*state, to = ?to, "handshake transition");
        *state = to;
        Ok(())
    }

    async fn phases(&self) -> Result<Session, HandshakeError> {
        // A fresh keypair per attempt; nothing from a failed attempt survives
        let keypair = Keypair::generate();

        self.transition(HandshakeState::SynSent)?;
        let ack = self.syn(&keypair).await?;

        let inbound_key = ChannelKey::generate();
        let outbound_key = self.key_exchange(&keypair, &ack, &inbound_key).await?;
        self.transition(HandshakeState::KeyExchanged)?;

        let session_token = self
            .authenticate(&ack.client_identifier, &inbound_key, &outbound_key)
            .await?;

        Ok(Session {
            client_identifier: ack.client_identifier,
            migration_priority: ack.migration_priority,
            keypair,
            master_public_key: ack.public_key,
            inbound_key,
            outbound_key,
            session_token,
        })
    }

    async fn syn(&self, keypair: &Keypair) -> Result<AuthAck, HandshakeError> {
        let request = AuthSyn {
            client_name: self.params.client_name.clone(),
            public_key: keypair.public_key(),
            port: self.params.port,
        };

        let ack: AuthAck = self
            .link
            .try_post("/handshake", &request, Auth::Anonymous)
            .await
            .map_err(HandshakeError::Syn)?;

        if ack.client_identifier.is_empty() {
            return Err(HandshakeError::Malformed(
                "master assigned an empty client identifier".to_string(),
            ));
        }
        Ok(ack)
    }

    async fn key_exchange(
        &self,
        keypair: &Keypair,
        ack: &AuthAck,
        inbound_key: &ChannelKey,
    ) -> Result<ChannelKey, HandshakeError> {
        let sealed = seal(&ack.public_key, inbound_key.as_bytes())?;
        let request = KeyExchange {
            key: encode_base64(&sealed),
        };

        let path = format!("/client/{}/key", ack.client_identifier);
        let reply: KeyExchange = self
            .link
            .try_post(&path, &request, Auth::Anonymous)
            .await
            .map_err(HandshakeError::KeyExchange)?;

        let opened = keypair.open(&decode_base64(&reply.key)?)?;
        Ok(ChannelKey::from_bytes(&opened)?)
    }

    async fn authenticate(
        &self,
        client_identifier: &str,
        inbound_key: &ChannelKey,
        outbound_key: &ChannelKey,
    ) -> Result<String, HandshakeError> {
        let plaintext = serde_json::to_vec(&AuthRequest {
            secret: self.params.secret.clone(),
            client_identifier: client_identifier.to_string(),
        })
        .map_err(|e| HandshakeError::Malformed(e.to_string()))?;

        let request = AuthSealed {
            payload: outbound_key.encrypt(&plaintext)?,
        };

        let path = format!("/client/{}/auth", client_identifier);
        let reply: AuthSealed = self
            .link
            .try_post(&path, &request, Auth::Anonymous)
            .await
            .map_err(HandshakeError::Auth)?;

        let grant: AuthGrant = serde_json::from_slice(&inbound_key.decrypt(&reply.payload)?)
            .map_err(|e| HandshakeError::Malformed(e.to_string()))?;

        if grant.session_token.is_empty() {
            return Err(HandshakeError::Malformed("empty session token".to_string()));
        }
        Ok(grant.session_token)
    }
}
