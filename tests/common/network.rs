use std::{
    collections::HashMap,
    sync::{
        mpsc::{self, Receiver, Sender, TryRecvError},
        Arc, Mutex,
    },
};

use ed25519_dalek::VerifyingKey;
use ibft_rs::{
    ibft::messages::IbftMessage, networking::network::Network, types::validator_set::ValidatorSet,
};

/// A mock network stub which passes messages from and to threads using channels.
#[derive(Clone)]
pub(crate) struct NetworkStub {
    my_verifying_key: VerifyingKey,
    all_peers: HashMap<VerifyingKey, Sender<(VerifyingKey, IbftMessage)>>,
    inbox: Arc<Mutex<Receiver<(VerifyingKey, IbftMessage)>>>,
}

impl NetworkStub {
    pub(crate) fn verifying_key(&self) -> VerifyingKey {
        self.my_verifying_key
    }
}

impl Network for NetworkStub {
    fn init_validator_set(&mut self, _: ValidatorSet) {}

    fn send(&mut self, peer: VerifyingKey, message: IbftMessage) {
        if let Some(peer) = self.all_peers.get(&peer) {
            let _ = peer.send((self.my_verifying_key, message));
        }
    }

    fn broadcast(&mut self, message: IbftMessage) {
        for (peer, sender) in &self.all_peers {
            if *peer != self.my_verifying_key {
                let _ = sender.send((self.my_verifying_key, message.clone()));
            }
        }
    }

    fn recv(&mut self) -> Option<(VerifyingKey, IbftMessage)> {
        match self.inbox.lock().unwrap().try_recv() {
            Ok(o_m) => Some(o_m),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => panic!(),
        }
    }
}

/// Create a stub for every peer, connecting every pair of peers. Messages sent to a peer whose stub was
/// dropped are lost.
pub(crate) fn mock_network(peers: impl Iterator<Item = VerifyingKey>) -> Vec<NetworkStub> {
    let mut all_peers = HashMap::new();
    let peer_and_inboxes: Vec<(VerifyingKey, Receiver<(VerifyingKey, IbftMessage)>)> = peers
        .map(|peer| {
            let (sender, receiver) = mpsc::channel();
            all_peers.insert(peer, sender);

            (peer, receiver)
        })
        .collect();

    peer_and_inboxes
        .into_iter()
        .map(|(my_verifying_key, inbox)| NetworkStub {
            my_verifying_key,
            all_peers: all_peers.clone(),
            inbox: Arc::new(Mutex::new(inbox)),
        })
        .collect()
}
