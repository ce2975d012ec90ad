use crate::config::Locale;
use crate::error::GenerationErrorKind;

/// User-facing text surfaced as session notices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Text {
    GenerationFailed(GenerationErrorKind),
    BuildApplied { version: u32 },
    BuildUnchanged,
    BuildQueued,
    BuildCancelled,
    JobFailed { error: Option<String> },
    JobTimedOut,
    ResumedJob,
    PersistFailed,
    ReviewApproved { summary: String },
    ReviewIssues { attempt: u32, max: u32, issues: Vec<String> },
    ReviewExhausted { issues: Vec<String> },
    ReviewFailed,
}

impl Text {
    pub fn render(&self, locale: Locale) -> String {
        match locale {
            Locale::En => self.render_en(),
            Locale::Es => self.render_es(),
        }
    }

    fn render_en(&self) -> String {
        match self {
            Self::GenerationFailed(kind) => match kind {
                GenerationErrorKind::Aborted => "The build was interrupted before it finished.",
                GenerationErrorKind::Authentication => {
                    "The generation service rejected our credentials. Sign in again and retry."
                }
                GenerationErrorKind::RateLimited => {
                    "Too many requests right now. Wait a moment and try again."
                }
                GenerationErrorKind::Unavailable => {
                    "The generation service is unavailable. Try again shortly."
                }
                GenerationErrorKind::Other => "Something went wrong while generating your site.",
            }
            .to_string(),
            Self::BuildApplied { version } => format!("Build applied as version {version}."),
            Self::BuildUnchanged => "Build finished with no file changes.".to_string(),
            Self::BuildQueued => "Build started. Progress will appear as phases finish.".to_string(),
            Self::BuildCancelled => "Build cancelled.".to_string(),
            Self::JobFailed { error } => match error {
                Some(error) => format!("Build failed: {error}"),
                None => "Build failed.".to_string(),
            },
            Self::JobTimedOut => {
                "Build stopped responding and was marked as timed out.".to_string()
            }
            Self::ResumedJob => "Resumed tracking your build in progress.".to_string(),
            Self::PersistFailed => {
                "Could not save your changes. Restored the last saved version.".to_string()
            }
            Self::ReviewApproved { summary } => format!("Quality review passed. {summary}"),
            Self::ReviewIssues {
                attempt,
                max,
                issues,
            } => format!(
                "Quality review found issues, applying fix {attempt} of {max}: {}",
                issues.join("; ")
            ),
            Self::ReviewExhausted { issues } => {
                format!("Quality review still has open issues: {}", issues.join("; "))
            }
            Self::ReviewFailed => "Quality review could not run.".to_string(),
        }
    }

    fn render_es(&self) -> String {
        match self {
            Self::GenerationFailed(kind) => match kind {
                GenerationErrorKind::Aborted => "La generación se interrumpió antes de terminar.",
                GenerationErrorKind::Authentication => {
                    "El servicio de generación rechazó las credenciales. Inicia sesión de nuevo."
                }
                GenerationErrorKind::RateLimited => {
                    "Demasiadas solicitudes. Espera un momento e inténtalo de nuevo."
                }
                GenerationErrorKind::Unavailable => {
                    "El servicio de generación no está disponible. Inténtalo más tarde."
                }
                GenerationErrorKind::Other => "Algo salió mal al generar tu sitio.",
            }
            .to_string(),
            Self::BuildApplied { version } => format!("Cambios aplicados como versión {version}."),
            Self::BuildUnchanged => "La generación terminó sin cambios.".to_string(),
            Self::BuildQueued => {
                "Generación iniciada. El progreso aparecerá al terminar cada fase.".to_string()
            }
            Self::BuildCancelled => "Generación cancelada.".to_string(),
            Self::JobFailed { error } => match error {
                Some(error) => format!("La generación falló: {error}"),
                None => "La generación falló.".to_string(),
            },
            Self::JobTimedOut => {
                "La generación dejó de responder y se marcó como vencida.".to_string()
            }
            Self::ResumedJob => "Se reanudó el seguimiento de tu generación.".to_string(),
            Self::PersistFailed => {
                "No se pudieron guardar los cambios. Se restauró la última versión guardada."
                    .to_string()
            }
            Self::ReviewApproved { summary } => format!("Revisión de calidad aprobada. {summary}"),
            Self::ReviewIssues {
                attempt,
                max,
                issues,
            } => format!(
                "La revisión encontró problemas, aplicando corrección {attempt} de {max}: {}",
                issues.join("; ")
            ),
            Self::ReviewExhausted { issues } => format!(
                "La revisión de calidad aún tiene problemas: {}",
                issues.join("; ")
            ),
            Self::ReviewFailed => "No se pudo ejecutar la revisión de calidad.".to_string(),
        }
    }
}
