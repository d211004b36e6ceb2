pub use crate::{
    BridgeLaunch, BridgeRealmFactory, ConsoleEntry, ConsoleLevel, Generation, RealmFactory,
    SandboxError, SandboxExecutionHarness, SandboxMessage, SandboxRealm, SandboxState,
};
