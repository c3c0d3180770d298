//! Sample document content for tests.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use nfe_core::{
    AccessKey, AccessKeyParts, Address, Cnpj, Cpf, DocumentNumber, Environment, Issuer, LineItem,
    NumericCode, Recipient, Series, StateRegistration, TaxBreakdown, TaxId, Timestamp, Totals, Uf,
};

use crate::document::DocumentContent;

/// Valid issuer CNPJ used throughout the fixtures.
pub const ISSUER_CNPJ: &str = "11222333000181";

pub fn sample_address(uf: Uf) -> Address {
    Address {
        street: "Rua das Flores".into(),
        number: "100".into(),
        complement: None,
        district: "Centro".into(),
        city_code: "3550308".into(),
        city: "Sao Paulo".into(),
        uf,
        postal_code: "01001000".into(),
        country_code: "1058".into(),
        country: "Brasil".into(),
        phone: None,
    }
}

pub fn sample_issuer() -> Issuer {
    Issuer {
        cnpj: Cnpj::parse(ISSUER_CNPJ).expect("cnpj"),
        name: "EMPRESA TESTE LTDA".into(),
        trade_name: None,
        state_registration: StateRegistration::parse("110042490114").expect("ie"),
        tax_regime: 3,
        address: sample_address(Uf::SP),
    }
}

pub fn sample_recipient() -> Recipient {
    Recipient {
        tax_id: TaxId::Cpf(Cpf::parse("52998224725").expect("cpf")),
        name: "CONSUMIDOR TESTE".into(),
        state_registration: None,
        email: None,
        address: sample_address(Uf::SP),
    }
}

/// One item: quantity 2 at 10.00, no tax detail.
pub fn sample_item() -> LineItem {
    LineItem {
        code: "P001".into(),
        description: "Camiseta algodao".into(),
        ean: None,
        ncm: "61091000".into(),
        cfop: "5102".into(),
        unit: "UN".into(),
        quantity: Decimal::from(2),
        unit_value: Decimal::from(10),
        taxes: TaxBreakdown::default(),
        additional_info: None,
    }
}

/// Series 1, homologation, issued in SP on 2024-03-15.
pub fn sample_content(number: u32) -> DocumentContent {
    let issuer = sample_issuer();
    let series = Series::new(1).expect("series");
    let number = DocumentNumber::new(number).expect("number");
    let access_key = AccessKey::compose(&AccessKeyParts {
        uf: Uf::SP,
        emitted_on: NaiveDate::from_ymd_opt(2024, 3, 15).expect("date"),
        issuer: issuer.cnpj.clone(),
        series,
        number,
        emission_type: 1,
        numeric_code: NumericCode::new(12_345_678).expect("cNF"),
    })
    .expect("access key");
    let items = vec![sample_item()];
    let totals = Totals::from_items(&items);
    DocumentContent {
        access_key,
        series,
        number,
        environment: Environment::Homologation,
        issuer,
        recipient: sample_recipient(),
        items,
        totals,
        operation_nature: "Venda".into(),
        issued_at: Timestamp::parse("2024-03-15T10:30:00-03:00").expect("timestamp"),
        notes: None,
    }
}
