//! # Authority Endpoints
//!
//! Each state either runs its own web services or delegates to a shared
//! virtual authority. The table maps `(UF, environment, service)` to a URL.
//!
//! | Authority | Serves                                                  |
//! |-----------|---------------------------------------------------------|
//! | AC        | AC                                                      |
//! | MS        | MS                                                      |
//! | PE        | PE                                                      |
//! | SP        | SP                                                      |
//! | SVRS      | AL, AP, DF, ES, PB, RJ, RN, RO, RR, SC, SE, TO          |
//!
//! Overrides take precedence over the built-in table, then a configured
//! base URL (every service at `{base}/{wsdl}`), then the table itself.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use nfe_core::{Environment, Uf};

use crate::error::TransportError;

/// Namespace prefix shared by every service definition.
pub const WSDL_NAMESPACE_BASE: &str = "http://www.portalfiscal.inf.br/nfe/wsdl";

/// One web service operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    /// `NFeAutorizacao4`: document batch submission.
    Authorize,
    /// `NFeRetAutorizacao4`: result of an asynchronous batch.
    ReceiptQuery,
    /// `NFeConsultaProtocolo4`: current situation of one document.
    Query,
    /// `NFeRecepcaoEvento4`: events, cancellation included.
    Event,
    /// `NFeInutilizacao4`: voiding a range of unused numbers.
    VoidRange,
    /// `NFeStatusServico4`: service availability.
    Status,
}

impl Service {
    pub const ALL: [Service; 6] = [
        Self::Authorize,
        Self::ReceiptQuery,
        Self::Query,
        Self::Event,
        Self::VoidRange,
        Self::Status,
    ];

    /// Service definition name, also the last segment of its namespace.
    pub fn wsdl(self) -> &'static str {
        match self {
            Self::Authorize => "NFeAutorizacao4",
            Self::ReceiptQuery => "NFeRetAutorizacao4",
            Self::Query => "NFeConsultaProtocolo4",
            Self::Event => "NFeRecepcaoEvento4",
            Self::VoidRange => "NFeInutilizacao4",
            Self::Status => "NFeStatusServico4",
        }
    }

    /// SOAP operation name.
    pub fn method(self) -> &'static str {
        match self {
            Self::Authorize => "nfeAutorizacaoLote",
            Self::ReceiptQuery => "nfeRetAutorizacaoLote",
            Self::Query => "nfeConsultaNF",
            Self::Event => "nfeRecepcaoEvento",
            Self::VoidRange => "nfeInutilizacaoNF",
            Self::Status => "nfeStatusServicoNF",
        }
    }

    pub fn namespace(self) -> String {
        format!("{WSDL_NAMESPACE_BASE}/{}", self.wsdl())
    }

    /// Label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Authorize => "authorize",
            Self::ReceiptQuery => "receipt_query",
            Self::Query => "query",
            Self::Event => "event",
            Self::VoidRange => "void_range",
            Self::Status => "status",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authority running web services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Authority {
    Ac,
    Ms,
    Pe,
    Sp,
    /// Shared virtual authority hosted by RS.
    Svrs,
}

impl Authority {
    /// The authority serving `uf`, if the table knows one.
    pub fn for_uf(uf: Uf) -> Option<Self> {
        use Uf::*;
        Some(match uf {
            AC => Self::Ac,
            MS => Self::Ms,
            PE => Self::Pe,
            SP => Self::Sp,
            AL | AP | DF | ES | PB | RJ | RN | RO | RR | SC | SE | TO => Self::Svrs,
            _ => return None,
        })
    }

    fn host(self, environment: Environment) -> &'static str {
        use Environment::*;
        match (self, environment) {
            (Self::Ac, Production) => "https://nfe.sefaz.ac.gov.br/ws/",
            (Self::Ac, Homologation) => "https://hom.nfe.sefaz.ac.gov.br/ws/",
            (Self::Ms, Production) => "https://nfe.sefaz.ms.gov.br/ws/",
            (Self::Ms, Homologation) => "https://hom.nfe.sefaz.ms.gov.br/ws/",
            (Self::Pe, Production) => "https://nfe.sefaz.pe.gov.br/nfe-service/services/",
            (Self::Pe, Homologation) => "https://nfehomolog.sefaz.pe.gov.br/nfe-service/services/",
            (Self::Sp, Production) => "https://nfe.fazenda.sp.gov.br/ws/",
            (Self::Sp, Homologation) => "https://homologacao.nfe.fazenda.sp.gov.br/ws/",
            (Self::Svrs, Production) => "https://nfe.svrs.rs.gov.br/ws/",
            (Self::Svrs, Homologation) => "https://nfe-homologacao.svrs.rs.gov.br/ws/",
        }
    }

    fn path(self, service: Service) -> &'static str {
        match self {
            Self::Sp => match service {
                Service::Authorize => "nfeautorizacao4.asmx",
                Service::ReceiptQuery => "nferetautorizacao4.asmx",
                Service::Query => "nfeconsultaprotocolo4.asmx",
                Service::Event => "nferecepcaoevento4.asmx",
                Service::VoidRange => "nfeinutilizacao4.asmx",
                Service::Status => "nfestatusservico4.asmx",
            },
            Self::Svrs => match service {
                Service::Authorize => "NfeAutorizacao/NFeAutorizacao4.asmx",
                Service::ReceiptQuery => "NfeRetAutorizacao/NFeRetAutorizacao4.asmx",
                Service::Query => "NfeConsulta/NfeConsulta4.asmx",
                Service::Event => "recepcaoevento/recepcaoevento4.asmx",
                Service::VoidRange => "nfeinutilizacao/nfeinutilizacao4.asmx",
                Service::Status => "NfeStatusServico/NfeStatusServico4.asmx",
            },
            Self::Ac | Self::Ms | Self::Pe => service.wsdl(),
        }
    }

    /// Built-in URL for one service.
    pub fn url(self, environment: Environment, service: Service) -> String {
        format!("{}{}", self.host(environment), self.path(service))
    }
}

/// One configured override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointOverride {
    pub uf: Uf,
    pub environment: Environment,
    pub service: Service,
    pub url: String,
}

/// Resolves endpoints. Immutable after construction and cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct EndpointTable {
    overrides: HashMap<(Uf, Environment, Service), Url>,
    base: Option<Url>,
}

impl EndpointTable {
    /// Only the built-in entries.
    pub fn builtin() -> Self {
        Self::default()
    }

    /// Route every service of every served state to `{base}/{wsdl}`.
    pub fn with_base(mut self, base: &str) -> Result<Self, TransportError> {
        let mut url = parse_url(base)?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        self.base = Some(url);
        Ok(self)
    }

    pub fn with_override(mut self, entry: &EndpointOverride) -> Result<Self, TransportError> {
        let url = parse_url(&entry.url)?;
        self.overrides
            .insert((entry.uf, entry.environment, entry.service), url);
        Ok(self)
    }

    /// The URL for `service` of the authority serving `uf`.
    pub fn resolve(&self, uf: Uf, environment: Environment, service: Service) -> Result<Url, TransportError> {
        if let Some(url) = self.overrides.get(&(uf, environment, service)) {
            return Ok(url.clone());
        }
        let authority = Authority::for_uf(uf).ok_or(TransportError::UnsupportedJurisdiction {
            uf,
            environment,
            service,
        })?;
        if let Some(base) = &self.base {
            return base
                .join(service.wsdl())
                .map_err(|e| TransportError::Setup(format!("endpoint {base}{}: {e}", service.wsdl())));
        }
        parse_url(&authority.url(environment, service))
    }
}

fn parse_url(raw: &str) -> Result<Url, TransportError> {
    Url::parse(raw).map_err(|e| TransportError::Setup(format!("invalid endpoint URL {raw}: {e}")))
}
