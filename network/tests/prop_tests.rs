use proptest::prelude::*;

use tradenet_network::{Peer, PeerGroup};
use tradenet_types::{Address, Capability, NetworkType, PublicKey};

#[derive(Clone, Debug)]
enum Op {
    Add(u16, u64),
    Remove(u16),
    RemoveConnection(u16, u64),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0u16..16, 0u64..4).prop_map(|(p, c)| Op::Add(p, c)),
        1 => (0u16..16).prop_map(Op::Remove),
        1 => (0u16..16, 0u64..4).prop_map(|(p, c)| Op::RemoveConnection(p, c)),
    ]
}

fn address(port: u16) -> Address {
    Address::clear("peer", port)
}

proptest! {
    /// No sequence of adds and removes grows the group past its bound.
    #[test]
    fn peer_group_never_exceeds_bound(
        max in 0usize..6,
        ops in prop::collection::vec(arb_op(), 0..64),
    ) {
        let group = PeerGroup::new(max);
        for op in ops {
            match op {
                Op::Add(port, connection_id) => {
                    let was_known = group.contains(&address(port));
                    let was_full = group.is_full();
                    let added = group.add(Peer {
                        address: address(port),
                        capability: Capability::new(None, [NetworkType::Clear], PublicKey([port as u8; 32])),
                        connection_id,
                        dialed: true,
                    });
                    prop_assert_eq!(added, was_known || !was_full);
                }
                Op::Remove(port) => {
                    group.remove(&address(port));
                }
                Op::RemoveConnection(port, connection_id) => {
                    group.remove_connection(&address(port), connection_id);
                }
            }
            prop_assert!(group.connected_peers().len() <= max);
        }
    }
}
