mod peer;
mod pipe;
mod test_setup;

pub(crate) use self::{
    peer::{connect_to_peer, Peer},
    test_setup::set_test_logger,
};
