use std::io;
use std::net::{Ipv4Addr, TcpListener};

use crate::error::{Error, Result};

/// Ask the kernel for a free loopback TCP port.
///
/// The listener is dropped before returning, so another process can grab the
/// port before the hypervisor binds it. The caller gets a likely-free number,
/// not a reservation.
pub fn allocate_ephemeral_port() -> Result<u16> {
    let listener =
        TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).map_err(Error::PortAllocation)?;
    let port = listener
        .local_addr()
        .map_err(Error::PortAllocation)?
        .port();
    drop(listener);

    if port == 0 {
        return Err(Error::PortAllocation(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            "kernel assigned port 0",
        )));
    }
    Ok(port)
}
