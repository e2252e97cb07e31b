//! Risk factor keys and the fixed phrase table each key searches for.
//!
//! Pattern definitions declare factors by string key; keys are resolved to a
//! `RiskFactor` once, at catalog load. The phrases are lowercase Spanish because
//! the monitored corpus is Mexican regional news.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RiskFactor {
    // Regulatory
    PermitSuspension,
    LicenseRevocation,
    RegulatoryInvestigation,
    ComplianceViolation,
    // Operational
    Explosion,
    OilSpill,
    FacilityFire,
    InfrastructureFailure,
    // Social
    CommunityProtest,
    AccessBlockade,
    IndigenousOpposition,
    ConsultationIssues,
    // Financial
    MajorLosses,
    RegulatoryFines,
    FinancingIssues,
    CostOverruns,
    // Pharma
    CofeprisSuspension,
    RegistrationRevocation,
    SanitaryInvestigation,
    DrugRecall,
    AdverseEffects,
    Contamination,
    CounterfeitDrugs,
    DrugShortage,
    HospitalShortage,
    SupplyInterruption,
    ImportIssues,
    /// A key outside the table. It searches for the key text itself.
    Custom(String),
}

impl RiskFactor {
    pub fn key(&self) -> &str {
        match self {
            RiskFactor::PermitSuspension => "permit_suspension",
            RiskFactor::LicenseRevocation => "license_revocation",
            RiskFactor::RegulatoryInvestigation => "regulatory_investigation",
            RiskFactor::ComplianceViolation => "compliance_violation",
            RiskFactor::Explosion => "explosion",
            RiskFactor::OilSpill => "oil_spill",
            RiskFactor::FacilityFire => "facility_fire",
            RiskFactor::InfrastructureFailure => "infrastructure_failure",
            RiskFactor::CommunityProtest => "community_protest",
            RiskFactor::AccessBlockade => "access_blockade",
            RiskFactor::IndigenousOpposition => "indigenous_opposition",
            RiskFactor::ConsultationIssues => "consultation_issues",
            RiskFactor::MajorLosses => "major_losses",
            RiskFactor::RegulatoryFines => "regulatory_fines",
            RiskFactor::FinancingIssues => "financing_issues",
            RiskFactor::CostOverruns => "cost_overruns",
            RiskFactor::CofeprisSuspension => "cofepris_suspension",
            RiskFactor::RegistrationRevocation => "registration_revocation",
            RiskFactor::SanitaryInvestigation => "sanitary_investigation",
            RiskFactor::DrugRecall => "drug_recall",
            RiskFactor::AdverseEffects => "adverse_effects",
            RiskFactor::Contamination => "contamination",
            RiskFactor::CounterfeitDrugs => "counterfeit_drugs",
            RiskFactor::DrugShortage => "drug_shortage",
            RiskFactor::HospitalShortage => "hospital_shortage",
            RiskFactor::SupplyInterruption => "supply_interruption",
            RiskFactor::ImportIssues => "import_issues",
            RiskFactor::Custom(key) => key.as_str(),
        }
    }

    /// Literal phrases searched in lowercased document text. Any single hit
    /// counts the factor as matched.
    pub fn search_terms(&self) -> Vec<&str> {
        match self {
            RiskFactor::PermitSuspension => vec!["suspensión", "permiso"],
            RiskFactor::LicenseRevocation => vec!["revocación", "licencia"],
            RiskFactor::RegulatoryInvestigation => vec!["investigación", "regulatoria"],
            RiskFactor::ComplianceViolation => vec!["violación", "cumplimiento"],
            RiskFactor::Explosion => vec!["explosión"],
            RiskFactor::OilSpill => vec!["derrame", "petróleo"],
            RiskFactor::FacilityFire => vec!["incendio", "instalaciones"],
            RiskFactor::InfrastructureFailure => vec!["falla", "infraestructura"],
            RiskFactor::CommunityProtest => vec!["protesta", "comunidad"],
            RiskFactor::AccessBlockade => vec!["bloqueo", "acceso"],
            RiskFactor::IndigenousOpposition => vec!["indígena", "oposición"],
            RiskFactor::ConsultationIssues => vec!["consulta"],
            RiskFactor::MajorLosses => vec!["pérdidas", "millones"],
            RiskFactor::RegulatoryFines => vec!["multa", "sanción"],
            RiskFactor::FinancingIssues => vec!["financiamiento", "crédito"],
            RiskFactor::CostOverruns => vec!["sobrecosto", "presupuesto"],
            RiskFactor::CofeprisSuspension => vec!["cofepris", "suspensión"],
            RiskFactor::RegistrationRevocation => vec!["registro", "revocación"],
            RiskFactor::SanitaryInvestigation => vec!["sanitaria", "investigación"],
            RiskFactor::DrugRecall => vec!["retiro", "medicamento"],
            RiskFactor::AdverseEffects => vec!["efectos adversos"],
            RiskFactor::Contamination => vec!["contaminación"],
            RiskFactor::CounterfeitDrugs => vec!["falsificación"],
            RiskFactor::DrugShortage => vec!["escasez", "medicamentos"],
            RiskFactor::HospitalShortage => vec!["desabasto", "hospitalario"],
            RiskFactor::SupplyInterruption => vec!["interrupción", "suministro"],
            RiskFactor::ImportIssues => vec!["importación", "problemas"],
            RiskFactor::Custom(key) => vec![key.as_str()],
        }
    }
}

impl From<&str> for RiskFactor {
    fn from(key: &str) -> Self {
        match key.trim() {
            "permit_suspension" => RiskFactor::PermitSuspension,
            "license_revocation" => RiskFactor::LicenseRevocation,
            "regulatory_investigation" => RiskFactor::RegulatoryInvestigation,
            "compliance_violation" => RiskFactor::ComplianceViolation,
            "explosion" => RiskFactor::Explosion,
            "oil_spill" => RiskFactor::OilSpill,
            "facility_fire" => RiskFactor::FacilityFire,
            "infrastructure_failure" => RiskFactor::InfrastructureFailure,
            "community_protest" => RiskFactor::CommunityProtest,
            "access_blockade" => RiskFactor::AccessBlockade,
            "indigenous_opposition" => RiskFactor::IndigenousOpposition,
            "consultation_issues" => RiskFactor::ConsultationIssues,
            "major_losses" => RiskFactor::MajorLosses,
            "regulatory_fines" => RiskFactor::RegulatoryFines,
            "financing_issues" => RiskFactor::FinancingIssues,
            "cost_overruns" => RiskFactor::CostOverruns,
            "cofepris_suspension" => RiskFactor::CofeprisSuspension,
            "registration_revocation" => RiskFactor::RegistrationRevocation,
            "sanitary_investigation" => RiskFactor::SanitaryInvestigation,
            "drug_recall" => RiskFactor::DrugRecall,
            "adverse_effects" => RiskFactor::AdverseEffects,
            "contamination" => RiskFactor::Contamination,
            "counterfeit_drugs" => RiskFactor::CounterfeitDrugs,
            "drug_shortage" => RiskFactor::DrugShortage,
            "hospital_shortage" => RiskFactor::HospitalShortage,
            "supply_interruption" => RiskFactor::SupplyInterruption,
            "import_issues" => RiskFactor::ImportIssues,
            other => RiskFactor::Custom(other.to_string()),
        }
    }
}

impl From<String> for RiskFactor {
    fn from(key: String) -> Self {
        RiskFactor::from(key.as_str())
    }
}

impl From<RiskFactor> for String {
    fn from(factor: RiskFactor) -> Self {
        factor.key().to_string()
    }
}

impl std::fmt::Display for RiskFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_keys_round_trip_through_the_table() {
        for key in ["oil_spill", "drug_recall", "import_issues", "explosion"] {
            assert_eq!(RiskFactor::from(key).key(), key);
        }
    }

    #[test]
    fn unknown_key_searches_for_itself() {
        let factor = RiskFactor::from("water_rights");
        assert_eq!(factor, RiskFactor::Custom("water_rights".into()));
        assert_eq!(factor.search_terms(), vec!["water_rights"]);
    }

    #[test]
    fn serializes_as_plain_key() {
        let json = serde_json::to_string(&RiskFactor::CommunityProtest).unwrap();
        assert_eq!(json, "\"community_protest\"");
        let back: RiskFactor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, RiskFactor::CommunityProtest);
    }
}
