use thiserror::Error as ThisError;

/// Conditions fatales au démarrage ; à l'exécution rien ne remonte jusqu'ici
#[derive(ThisError, Debug)]
pub enum KernelError {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error("failed to open persistence sink: {0}")]
    Sink(#[from] crate::ports::SinkError),

    #[error("initial MQTT subscription failed: {0}")]
    Subscribe(#[from] rumqttc::ClientError),

    #[error("broker refused {0} initial subscription(s)")]
    SubscriptionRefused(usize),

    #[error("failed to bind HTTP listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, KernelError>;
