//! Per-connection session
//!
//! A session reads signals until the client closes, sends garbage, or the
//! connection fails. Whatever ends it, the AP bound to the connection is
//! then retracted from every variable it shares and unregistered.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, warn};

use svar_signals::asyncio::{read_frame, write_frame};
use svar_signals::frame::INITIAL_RECV_BUFFER;
use svar_types::partner::Partner;

use crate::state::ServerState;

pub struct Session {
    pub(crate) state: ServerState,
    /// Remote address, for logs
    pub(crate) peer: String,
    me: Option<Partner>,
}

impl Session {
    pub fn new(state: ServerState, peer: String) -> Self {
        Self {
            state,
            peer,
            me: None,
        }
    }

    /// The AP this connection registered as
    pub fn identity(&self) -> Option<Partner> {
        self.me
    }

    pub(crate) fn bind(&mut self, me: Partner) {
        self.me = Some(me);
    }

    /// Serve the connection until it ends.
    pub async fn run<S>(mut self, mut stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        info!(peer = %self.peer, "client connected");
        let mut buf = vec![0u8; INITIAL_RECV_BUFFER];
        loop {
            let signal = match read_frame(&mut stream, &mut buf).await {
                Ok(Some(signal)) => signal,
                Ok(None) => {
                    info!(peer = %self.peer, "client closed the connection");
                    break;
                }
                Err(e) => {
                    warn!(peer = %self.peer, error = %e, "bad frame; dropping client");
                    break;
                }
            };
            match self.dispatch(signal) {
                Ok(Some(reply)) => {
                    if let Err(e) = write_frame(&mut stream, &reply).await {
                        warn!(peer = %self.peer, error = %e, "reply not sent; dropping client");
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(peer = %self.peer, error = %e, "dropping client");
                    break;
                }
            }
        }
        self.finish();
    }

    /// Retract and unregister the bound AP, once.
    fn finish(&mut self) {
        let Some(me) = self.me.take() else {
            return;
        };
        let retracted = self.state.with_shared(|s, outbox| {
            let n = s.registry.retract_all_by(&me.id, outbox);
            s.registry.unregister_processor(&me.id);
            n
        });
        info!(peer = %self.peer, id = %me.id, retracted, "session ended");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use svar_signals::Signal;
    use svar_types::ids::{ApNum3, SvKey};
    use svar_types::name::VarName;
    use svar_types::partner::Coupling;
    use tokio::io::AsyncWriteExt;

    const A: ApNum3 = ApNum3 { proc: 1001, parent: 0, grand: 0 };

    fn register(id: ApNum3) -> Signal {
        Signal::RegisterProcessor {
            id,
            evconn: false,
            progname: "test".into(),
            pid: 10,
            port: 0,
        }
    }

    #[tokio::test]
    async fn test_session_replies_and_cleans_up() {
        let state = ServerState::new(IpAddr::V4(Ipv4Addr::LOCALHOST)).unwrap();
        let (mut client, server) = tokio::io::duplex(4096);
        let task = tokio::spawn(Session::new(state.clone(), "duplex".into()).run(server));

        write_frame(&mut client, &register(A)).await.unwrap();
        let mut buf = Vec::new();
        assert_eq!(
            read_frame(&mut client, &mut buf).await.unwrap(),
            Some(Signal::YesNo { yes: true })
        );

        write_frame(
            &mut client,
            &Signal::MatchOrMake {
                name: VarName::new("X"),
                to: ApNum3::GENERAL,
                from: A,
            },
        )
        .await
        .unwrap();
        let key = match read_frame(&mut client, &mut buf).await.unwrap() {
            Some(Signal::MatchOrMakeResult { key, coupling }) => {
                assert_eq!(coupling, Coupling::Offered);
                key
            }
            other => panic!("unexpected reply {:?}", other),
        };

        // orderly close
        client.write_all(&0u32.to_be_bytes()).await.unwrap();
        task.await.unwrap();

        let reg = state.snapshot();
        assert!(reg.get_var(key).is_none());
        assert!(!reg.is_registered(&A));
    }

    #[tokio::test]
    async fn test_unknown_signal_ends_session() {
        let state = ServerState::new(IpAddr::V4(Ipv4Addr::LOCALHOST)).unwrap();
        let (mut client, server) = tokio::io::duplex(4096);
        let task = tokio::spawn(Session::new(state.clone(), "duplex".into()).run(server));

        write_frame(&mut client, &register(A)).await.unwrap();
        let mut buf = Vec::new();
        read_frame(&mut client, &mut buf).await.unwrap();

        // id 999 does not exist
        client.write_all(&2u32.to_be_bytes()).await.unwrap();
        client.write_all(&999u16.to_be_bytes()).await.unwrap();
        task.await.unwrap();

        assert!(!state.snapshot().is_registered(&A));
        assert_eq!(state.snapshot().coupling(SvKey::from_raw(1)), Coupling::NoCoupling);
    }
}
