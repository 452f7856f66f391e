use thiserror::Error;

use crate::language::Language;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("message is empty after sanitization")]
    EmptyMessage,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    /// Every text-generation provider failed or was unavailable.
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        self.localized_message(Language::En)
    }

    /// Message safe to show the end user, in the conversation language.
    pub fn localized_message(&self, language: Language) -> &'static str {
        match self {
            Self::BadRequest { .. } => match language {
                Language::Fr => "La demande n'a pas pu être traitée. Vérifiez votre message.",
                Language::En => "The request could not be processed. Check inputs and try again.",
                Language::Es => "No se pudo procesar la solicitud. Revise su mensaje.",
                Language::Ar => "تعذر معالجة الطلب. يرجى التحقق من رسالتك.",
                Language::Ary => "ما قدرناش نعالجو الطلب. شوف الميساج ديالك.",
            },
            Self::ServiceUnavailable { .. } => match language {
                Language::Fr => {
                    "Désolé, le service est temporairement indisponible. Veuillez réessayer plus tard."
                }
                Language::En => {
                    "Sorry, the service is temporarily unavailable. Please try again later."
                }
                Language::Es => {
                    "Lo sentimos, el servicio no está disponible temporalmente. Por favor, inténtelo más tarde."
                }
                Language::Ar => "عذراً، الخدمة غير متاحة مؤقتاً. يرجى المحاولة لاحقاً.",
                Language::Ary => "سمحلينا، الخدمة ماشي متوفرة دابا. عاود جرب من بعد.",
            },
            Self::Internal { .. } => match language {
                Language::Fr => "Une erreur interne inattendue est survenue.",
                Language::En => "An unexpected internal error occurred.",
                Language::Es => "Se produjo un error interno inesperado.",
                Language::Ar => "حدث خطأ داخلي غير متوقع.",
                Language::Ary => "وقع شي مشكل داخلي.",
            },
        }
    }

    /// HTTP status the boundary answers with; never a 2xx.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest { .. } => 400,
            Self::ServiceUnavailable { .. } => 503,
            Self::Internal { .. } => 500,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(error) => Self::BadRequest {
                message: error.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}
