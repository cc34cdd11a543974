//! Chaîne d'import: étapes nommées exécutées dans l'ordre
//!
//! Un import complet (dépôt des candidats, inspection, statuts) est une
//! suite d'étapes. La première étape en échec interrompt le reste de la
//! chaîne et déclenche une notification; il n'y a ni reprise partielle
//! ni timeout, la chaîne se relance entière.

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use tracing::{error, info};

/// Notification de fin de chaîne (succès ou échec)
///
/// Fire-and-forget: un échec de notification ne fait jamais échouer la
/// chaîne elle-même.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Notificateur adossé aux logs structurés
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        info!(target: "rnb_pg::notify", "{message}");
    }
}

/// Déclenchement de tâches annexes (rafraîchissement de vues, exports)
///
/// Fire-and-forget: le dispatch n'attend pas l'exécution de la tâche.
pub trait TaskDispatcher: Send + Sync {
    fn dispatch(&self, task: &str);
}

/// Dispatcher adossé aux logs structurés
pub struct LogDispatcher;

impl TaskDispatcher for LogDispatcher {
    fn dispatch(&self, task: &str) {
        info!(target: "rnb_pg::dispatch", task, "Task dispatched");
    }
}

type StageFuture = BoxFuture<'static, Result<()>>;

struct Stage {
    name: &'static str,
    future: StageFuture,
}

/// Chaîne d'étapes nommées
pub struct ImportChain {
    stages: Vec<Stage>,
    notifier: Box<dyn Notifier>,
}

impl ImportChain {
    pub fn new(notifier: Box<dyn Notifier>) -> Self {
        Self {
            stages: Vec::new(),
            notifier,
        }
    }

    /// Ajoute une étape; les étapes s'exécutent dans l'ordre d'ajout
    pub fn stage(mut self, name: &'static str, future: StageFuture) -> Self {
        self.stages.push(Stage { name, future });
        self
    }

    /// Exécute les étapes dans l'ordre, s'arrête à la première en échec
    pub async fn run(self) -> Result<()> {
        let total = self.stages.len();
        for (index, stage) in self.stages.into_iter().enumerate() {
            info!(
                stage = stage.name,
                step = index + 1,
                total,
                "Running import stage"
            );

            if let Err(e) = stage
                .future
                .await
                .with_context(|| format!("Stage '{}' failed", stage.name))
            {
                error!(stage = stage.name, "Import chain aborted: {e:#}");
                self.notifier
                    .notify(&format!("import chain aborted at stage '{}'", stage.name));
                return Err(e);
            }
        }

        self.notifier.notify("import chain completed");
        Ok(())
    }
}
