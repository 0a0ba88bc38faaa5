use std::error::Error;
use std::fmt;

use crate::NodeId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    Missing { id: NodeId },
    NotAContainer { id: NodeId },
    NotAChild { parent: NodeId, child: NodeId },
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::Missing { id } => write!(f, "host node {id} missing"),
            HostError::NotAContainer { id } => write!(f, "host node {id} cannot hold children"),
            HostError::NotAChild { parent, child } => {
                write!(f, "host node {child} is not a child of {parent}")
            }
        }
    }
}

impl Error for HostError {}

/// Failure raised by a component function while rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentError {
    message: String,
}

impl ComponentError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ComponentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for ComponentError {}

impl From<&str> for ComponentError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for ComponentError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// A component returned an error; the in-progress pass was discarded.
    Component {
        component: &'static str,
        source: ComponentError,
    },
    Host(HostError),
    /// A component kept scheduling updates on itself while rendering.
    TooManyRenders { component: &'static str },
    RootUnmounted,
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Component { component, source } => {
                write!(f, "component {component} failed: {source}")
            }
            RenderError::Host(err) => write!(f, "host operation failed: {err}"),
            RenderError::TooManyRenders { component } => write!(
                f,
                "too many re-renders of {component}; render-phase updates must settle"
            ),
            RenderError::RootUnmounted => f.write_str("root has been unmounted"),
        }
    }
}

impl Error for RenderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RenderError::Component { source, .. } => Some(source),
            RenderError::Host(err) => Some(err),
            _ => None,
        }
    }
}

impl From<HostError> for RenderError {
    fn from(err: HostError) -> Self {
        RenderError::Host(err)
    }
}
