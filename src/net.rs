// Copyright (C) 2025  Tom Waddington
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published
// by the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Ephemeral port allocation for the terminal bridge
//!
//! A listener is bound to port 0, the assigned port is read back and the
//! listener is closed again. Nothing reserves the port afterwards, so the
//! bridge may lose it to another process; callers treat that as a
//! retryable start failure.

use std::io;
use std::net::TcpListener;
use tracing::debug;

use crate::error::AllocationError;

const ANY_ADDR: &str = "0.0.0.0:0";

/// Capability to open a listening socket.
pub trait Listen {
    type Listener: BoundListener;

    fn listen(&self, addr: &str) -> io::Result<Self::Listener>;
}

pub trait BoundListener {
    fn local_port(&self) -> io::Result<u16>;

    fn close(self) -> io::Result<()>;
}

/// The operating system's TCP stack.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpNet;

impl Listen for TcpNet {
    type Listener = TcpListener;

    fn listen(&self, addr: &str) -> io::Result<TcpListener> {
        TcpListener::bind(addr)
    }
}

impl BoundListener for TcpListener {
    fn local_port(&self) -> io::Result<u16> {
        self.local_addr().map(|addr| addr.port())
    }

    fn close(self) -> io::Result<()> {
        drop(self);
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct PortAllocator<N = TcpNet> {
    net: N,
}

impl PortAllocator<TcpNet> {
    pub fn new() -> Self {
        Self { net: TcpNet }
    }
}

impl<N: Listen> PortAllocator<N> {
    pub fn with_net(net: N) -> Self {
        Self { net }
    }

    pub fn allocate(&self) -> Result<u16, AllocationError> {
        let listener = self.net.listen(ANY_ADDR).map_err(AllocationError::Listen)?;

        let port = match listener.local_port() {
            Ok(port) => port,
            Err(e) => {
                let _ = listener.close();
                return Err(AllocationError::LocalAddr(e));
            }
        };

        listener.close().map_err(AllocationError::Close)?;

        if port == 0 {
            return Err(AllocationError::Unassigned);
        }

        debug!(port, "allocated port");
        Ok(port)
    }
}
