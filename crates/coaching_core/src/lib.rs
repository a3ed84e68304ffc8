pub mod credits;
pub mod documents;
pub mod domain;
pub mod flows;
pub mod packages;
pub mod ports;
pub mod pricing;
pub mod reader;
pub mod reports;
pub mod wizard;

pub use credits::{Charge, CreditError, CreditLedger};
pub use documents::{DocumentError, DocumentLibrary, UploadFile, UploadRejection};
pub use domain::{
    AuthSession, ChangeEvent, CreditBalance, CreditKind, Document, DocumentKind, Package,
    Profile, QueuedPackage, Report, ReportStatus, ReportType, User, UserCredentials,
};
pub use flows::FlowError;
pub use packages::{PackageEntry, PackageError, PackageManager, PackageSnapshot};
pub use ports::{
    AdvisorChat, ChangeFeed, CreditStore, DatabaseService, DocumentStorage, Notifier,
    PackageStore, PortError, PortResult, RemoteFunctions, ReportStore,
};
pub use reader::Reader;
pub use reports::{ReportError, ReportFilter, ReportManager};
pub use wizard::{FieldError, Wizard};
