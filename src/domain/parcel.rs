//! 조회 결과 레코드: SIGEF 파셀 상세 정보
//!
//! 컨트롤러 입장에서 레코드는 불투명한 텍스트 묶음이며,
//! 유일한 책임은 고정된 필드 순서의 파이프 구분 한 줄로 직렬화하는 것입니다.

use serde::{Deserialize, Serialize};

/// 출력 라인의 구분자
pub const FIELD_SEPARATOR: &str = " | ";

/// 출력 라인 헤더 (필드 순서 그대로)
pub const OUTPUT_HEADER: [&str; 17] = [
    "Parcel code",
    "Owner name",
    "Owner CPF/CNPJ",
    "Denomination",
    "Area",
    "Parcel situation",
    "Technical manager",
    "Area situation",
    "City-UF",
    "Registry office",
    "CNS",
    "Registration",
    "Registration situation",
    "INCRA code",
    "Property type",
    "Date of entry",
    "RT document",
];

/// 파셀 한 건의 조회 결과
///
/// 모든 필드는 원격 페이지에서 추출한 텍스트 그대로이며 검증하지 않습니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParcelRecord {
    pub parcel_code: String,
    pub owner_name: String,
    pub owner_cpf_or_cnpj: String,
    pub denomination: String,
    pub area: String,
    pub situation_parcel: String,
    pub technical_manager: String,
    pub situation_area: String,
    pub city_uf: String,
    pub registry_office: String,
    pub cns: String,
    pub registration: String,
    pub registration_situation: String,
    pub code_incra: String,
    pub property_type: String,
    pub date_of_entry: String,
    pub rt_document: String,
}

impl ParcelRecord {
    /// 식별자만 채운 빈 레코드
    #[must_use]
    pub fn with_code(parcel_code: impl Into<String>) -> Self {
        Self {
            parcel_code: parcel_code.into(),
            ..Self::default()
        }
    }

    /// 출력 순서대로 필드를 나열합니다.
    #[must_use]
    pub fn fields(&self) -> [&str; 17] {
        [
            self.parcel_code.as_str(),
            self.owner_name.as_str(),
            self.owner_cpf_or_cnpj.as_str(),
            self.denomination.as_str(),
            self.area.as_str(),
            self.situation_parcel.as_str(),
            self.technical_manager.as_str(),
            self.situation_area.as_str(),
            self.city_uf.as_str(),
            self.registry_office.as_str(),
            self.cns.as_str(),
            self.registration.as_str(),
            self.registration_situation.as_str(),
            self.code_incra.as_str(),
            self.property_type.as_str(),
            self.date_of_entry.as_str(),
            self.rt_document.as_str(),
        ]
    }

    /// 파이프 구분 출력 라인 (개행 없음)
    #[must_use]
    pub fn to_output_line(&self) -> String {
        self.fields().join(FIELD_SEPARATOR)
    }
}

/// 헤더 라인
#[must_use]
pub fn output_header_line() -> String {
    OUTPUT_HEADER.join(FIELD_SEPARATOR)
}
