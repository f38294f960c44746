//! Procedure handler registry.
//!
//! Every supported RPC procedure is identified by a [`HandlerId`], the pair
//! of its program (protocol) number and procedure number. Protocol
//! implementations register one [`HandleFunc`] per procedure, and the
//! connection-serving code resolves incoming calls against the registry.
//!
//! There are two ways to populate a registry:
//!
//! - build a [`HandlerRegistry`] value explicitly and hand it to the server
//!   through [`ServerConfig::with_registry`](crate::server::ServerConfig::with_registry);
//! - call [`register_handler`] during program start-up. The process-wide
//!   table it fills is snapshotted by every server when it starts serving,
//!   so registrations must happen before `serve` is called. A server does
//!   not see procedures registered after it started.
//!
//! Registrations are never replaced or removed: registering the same pair
//! twice fails with [`RegistrationError::AlreadyRegistered`] and leaves the
//! first handler in place.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use futures::future::BoxFuture;
use thiserror::Error;

use crate::handler::Handler;
use crate::protocol::rpc::{CallContext, ResponseWriter};
use crate::protocol::xdr::{mount, nfs3};

/// Identifies one registrable procedure within a protocol family.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId {
    protocol: u32,
    procedure: u32,
}

impl HandlerId {
    pub const fn new(protocol: u32, procedure: u32) -> Self {
        Self { protocol, procedure }
    }

    /// RPC program number.
    pub fn protocol(&self) -> u32 {
        self.protocol
    }

    /// Procedure number within the program.
    pub fn procedure(&self) -> u32 {
        self.procedure
    }
}

/// Renders as `"<service> <procedure>"`, e.g. `nfs GETATTR` or `mount MNT`.
/// Unknown programs and procedures are rendered as numbers.
impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.protocol {
            mount::PROGRAM => {
                f.write_str("mount ")?;
                mount::MountProgram::from_proc(self.procedure).map(|p| p.name())
            }
            nfs3::PROGRAM => {
                f.write_str("nfs ")?;
                nfs3::NFSProgram::from_proc(self.procedure).map(|p| p.name())
            }
            protocol => {
                write!(f, "{protocol} ")?;
                None
            }
        };
        match name {
            Some(name) => f.write_str(name),
            None => write!(f, "{}", self.procedure),
        }
    }
}

/// A procedure implementation.
///
/// Receives the decoded call, a one-shot writer for its reply and the
/// application [`Handler`]. Any state beyond that has to be captured by the
/// function itself. Implemented for every matching async closure or `fn`.
pub trait HandleFunc: Send + Sync + 'static {
    fn call(
        &self,
        ctx: CallContext,
        reply: ResponseWriter,
        handler: Arc<dyn Handler>,
    ) -> BoxFuture<'static, anyhow::Result<()>>;
}

impl<F, Fut> HandleFunc for F
where
    F: Fn(CallContext, ResponseWriter, Arc<dyn Handler>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn call(
        &self,
        ctx: CallContext,
        reply: ResponseWriter,
        handler: Arc<dyn Handler>,
    ) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin((self)(ctx, reply, handler))
    }
}

/// Result of a successful lookup: the resolved id and its function.
#[derive(Clone)]
pub struct HandleContext {
    pub id: HandlerId,
    pub func: Arc<dyn HandleFunc>,
}

impl HandleContext {
    /// Runs the resolved procedure.
    pub async fn invoke(
        &self,
        ctx: CallContext,
        reply: ResponseWriter,
        handler: Arc<dyn Handler>,
    ) -> anyhow::Result<()> {
        self.func.call(ctx, reply, handler).await
    }
}

impl fmt::Debug for HandleContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("HandleContext").field("id", &self.id).finish_non_exhaustive()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("{0} already registered")]
    AlreadyRegistered(HandlerId),
}

/// Table of procedure handlers keyed by [`HandlerId`].
///
/// Cloning is cheap: handler functions are shared.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<HandlerId, Arc<dyn HandleFunc>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `(protocol, procedure)`.
    ///
    /// Fails if the pair is already taken; the existing entry is kept.
    pub fn register<F, Fut>(
        &mut self,
        protocol: u32,
        procedure: u32,
        handler: F,
    ) -> Result<(), RegistrationError>
    where
        F: Fn(CallContext, ResponseWriter, Arc<dyn Handler>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.insert(HandlerId::new(protocol, procedure), Arc::new(handler))
    }

    fn insert(
        &mut self,
        id: HandlerId,
        handler: Arc<dyn HandleFunc>,
    ) -> Result<(), RegistrationError> {
        use std::collections::hash_map::Entry;

        match self.handlers.entry(id) {
            Entry::Occupied(_) => Err(RegistrationError::AlreadyRegistered(id)),
            Entry::Vacant(slot) => {
                slot.insert(handler);
                Ok(())
            }
        }
    }

    /// Finds the handler for `(protocol, procedure)`. A miss is not an error.
    pub fn lookup(&self, protocol: u32, procedure: u32) -> Option<HandleContext> {
        let id = HandlerId::new(protocol, procedure);
        self.handlers.get(&id).map(|func| HandleContext { id, func: func.clone() })
    }

    /// Returns true if at least one procedure of `protocol` is registered.
    pub fn serves_program(&self, protocol: u32) -> bool {
        self.handlers.keys().any(|id| id.protocol == protocol)
    }

    /// Registered ids in ascending order.
    pub fn ids(&self) -> Vec<HandlerId> {
        let mut ids: Vec<_> = self.handlers.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_set().entries(self.ids().iter().map(|id| id.to_string())).finish()
    }
}

// Created on first registration.
static REGISTERED_HANDLERS: RwLock<Option<HandlerRegistry>> = RwLock::new(None);

/// Registers `handler` in the process-wide table.
///
/// Meant to be called once per supported procedure while the program starts,
/// before any server begins serving.
pub fn register_handler<F, Fut>(
    protocol: u32,
    procedure: u32,
    handler: F,
) -> Result<(), RegistrationError>
where
    F: Fn(CallContext, ResponseWriter, Arc<dyn Handler>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    // The table is only ever appended to, so a poisoned lock still guards
    // consistent data.
    let mut table = REGISTERED_HANDLERS.write().unwrap_or_else(PoisonError::into_inner);
    table.get_or_insert_with(HandlerRegistry::new).register(protocol, procedure, handler)
}

/// Looks up `(protocol, procedure)` in the process-wide table.
pub fn registered_handler(protocol: u32, procedure: u32) -> Option<HandleContext> {
    let table = REGISTERED_HANDLERS.read().unwrap_or_else(PoisonError::into_inner);
    table.as_ref().and_then(|registry| registry.lookup(protocol, procedure))
}

/// Snapshot of the process-wide table.
pub fn registered_handlers() -> HandlerRegistry {
    let table = REGISTERED_HANDLERS.read().unwrap_or_else(PoisonError::into_inner);
    table.clone().unwrap_or_default()
}
