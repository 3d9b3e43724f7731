use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Display name used when a stored report references a category that is no longer configured.
pub const UNKNOWN_CATEGORY_NAME: &str = "Categoria Desconhecida";
pub const UNKNOWN_SUBCATEGORY_NAME: &str = "Subcategoria Desconhecida";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subcategory {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub icon: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub subcategories: Vec<Subcategory>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CategorySettings {
    pub require_subcategory: bool,
    pub allow_other_subcategory: bool,
    pub max_other_description: usize,
    pub default_category: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationRequirement {
    Required,
    Optional,
    NotNeeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensitivityLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormConfiguration {
    pub map_picker: bool,
    pub address_required: bool,
    pub coordinates_required: bool,
    pub show_on_public_map: bool,
    pub show_location_checkbox: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct FormConfigurations {
    location_required: FormConfiguration,
    location_optional: FormConfiguration,
    location_not_needed: FormConfiguration,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct LocationRequirements {
    location_required: Vec<String>,
    location_optional: Vec<String>,
    location_not_needed: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct AnonymousReporting {
    anonymous_allowed: Vec<String>,
    identification_required: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct SensitivityLevels {
    high: Vec<String>,
    medium: Vec<String>,
    low: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
    Select,
    Textarea,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportField {
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub placeholder: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportType {
    pub id: String,
    pub name: String,
    pub icon: String,
    #[serde(default)]
    pub fields: Vec<TransportField>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct TransportSettings {
    required: Vec<String>,
    types: Vec<TransportType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadPolicy {
    pub max_files: usize,
    pub allowed_types: Vec<String>,
}

impl UploadPolicy {
    pub fn allows(&self, content_type: &str) -> bool {
        self.allowed_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(content_type))
    }
}

#[derive(Debug, Clone, Deserialize)]
struct UploadPolicies {
    default: UploadPolicy,
    #[serde(default)]
    categories: HashMap<String, UploadPolicy>,
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogDocument {
    categories: Vec<Category>,
    #[serde(default)]
    settings: CategorySettings,
    #[serde(default)]
    location_requirements: LocationRequirements,
    #[serde(default)]
    form_configurations: FormConfigurations,
    #[serde(default)]
    anonymous_reporting: AnonymousReporting,
    #[serde(default)]
    sensitivity_levels: SensitivityLevels,
    other_category: Option<Category>,
    #[serde(default)]
    transport: TransportSettings,
    uploads: UploadPolicies,
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
    pub description: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("category with ID '{0}' not found")]
    CategoryNotFound(String),
    #[error("subcategory with ID '{subcategory}' not found in category '{category}'")]
    SubcategoryNotFound {
        category: String,
        subcategory: String,
    },
    #[error("subcategory is required for category '{0}'")]
    SubcategoryRequired(String),
    #[error("transport type '{0}' not found")]
    TransportTypeNotFound(String),
}

impl CatalogError {
    pub fn is_not_found(&self) -> bool {
        !matches!(self, Self::SubcategoryRequired(_))
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LocationError {
    #[error("location is required for category '{0}'")]
    Required(String),
    #[error("invalid coordinates provided")]
    MissingCoordinates,
    #[error("coordinates out of valid range")]
    OutOfRange,
}

/// Read-only category, location, transport and upload policy, loaded once at startup.
#[derive(Debug, Clone)]
pub struct CategoryCatalog {
    categories: Vec<Category>,
    other_category: Option<Category>,
    settings: CategorySettings,
    location: LocationRequirements,
    forms: FormConfigurations,
    anonymous: AnonymousReporting,
    sensitivity: SensitivityLevels,
    transport: TransportSettings,
    uploads: UploadPolicies,
}

impl CategoryCatalog {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read categories config {}", path.display()))?;
        Self::from_toml_str(&raw)
            .with_context(|| format!("failed to load categories config {}", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let document: CatalogDocument =
            toml::from_str(raw).map_err(|err| anyhow!("failed to parse categories: {}", err))?;

        let catalog = Self {
            categories: document.categories,
            other_category: document.other_category,
            settings: document.settings,
            location: document.location_requirements,
            forms: document.form_configurations,
            anonymous: document.anonymous_reporting,
            sensitivity: document.sensitivity_levels,
            transport: document.transport,
            uploads: document.uploads,
        };
        catalog.check_invariants()?;
        Ok(catalog)
    }

    fn check_invariants(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for category in self.categories.iter().chain(self.other_category.iter()) {
            if !ids.insert(category.id.as_str()) {
                return Err(anyhow!("duplicate category id: {}", category.id));
            }
            let mut sub_ids = HashSet::new();
            for sub in &category.subcategories {
                if !sub_ids.insert(sub.id.as_str()) {
                    return Err(anyhow!(
                        "duplicate subcategory id {} in category {}",
                        sub.id,
                        category.id
                    ));
                }
            }
        }

        let mut tiers: HashMap<&str, &str> = HashMap::new();
        let lists = [
            ("location_required", &self.location.location_required),
            ("location_optional", &self.location.location_optional),
            ("location_not_needed", &self.location.location_not_needed),
        ];
        for (tier, list) in lists {
            for id in list {
                if let Some(previous) = tiers.insert(id.as_str(), tier) {
                    return Err(anyhow!(
                        "category {} listed in both {} and {}",
                        id,
                        previous,
                        tier
                    ));
                }
            }
        }

        let mut type_ids = HashSet::new();
        for transport_type in &self.transport.types {
            if !type_ids.insert(transport_type.id.as_str()) {
                return Err(anyhow!("duplicate transport type: {}", transport_type.id));
            }
            let mut names = HashSet::new();
            for field in &transport_type.fields {
                if !names.insert(field.name.as_str()) {
                    return Err(anyhow!(
                        "duplicate field {} in transport type {}",
                        field.name,
                        transport_type.id
                    ));
                }
            }
        }

        Ok(())
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn settings(&self) -> &CategorySettings {
        &self.settings
    }

    pub fn category(&self, id: &str) -> Result<&Category, CatalogError> {
        self.categories
            .iter()
            .chain(self.other_category.iter())
            .find(|category| category.id == id)
            .ok_or_else(|| CatalogError::CategoryNotFound(id.to_string()))
    }

    pub fn subcategory(
        &self,
        category_id: &str,
        subcategory_id: &str,
    ) -> Result<&Subcategory, CatalogError> {
        self.category(category_id)?
            .subcategories
            .iter()
            .find(|sub| sub.id == subcategory_id)
            .ok_or_else(|| CatalogError::SubcategoryNotFound {
                category: category_id.to_string(),
                subcategory: subcategory_id.to_string(),
            })
    }

    pub fn validate_category(
        &self,
        category_id: &str,
        subcategory_id: Option<&str>,
    ) -> Result<(), CatalogError> {
        self.category(category_id)?;
        match subcategory_id.filter(|sub| !sub.is_empty()) {
            Some(sub) => self.subcategory(category_id, sub).map(|_| ()),
            None if self.settings.require_subcategory => {
                Err(CatalogError::SubcategoryRequired(category_id.to_string()))
            }
            None => Ok(()),
        }
    }

    /// Unlisted categories default to `Optional`.
    pub fn location_requirement(&self, category_id: &str) -> LocationRequirement {
        let listed = |list: &[String]| list.iter().any(|id| id == category_id);
        if listed(&self.location.location_required) {
            LocationRequirement::Required
        } else if listed(&self.location.location_not_needed) {
            LocationRequirement::NotNeeded
        } else {
            LocationRequirement::Optional
        }
    }

    pub fn form_configuration(&self, category_id: &str) -> FormConfiguration {
        match self.location_requirement(category_id) {
            LocationRequirement::Required => self.forms.location_required,
            LocationRequirement::Optional => self.forms.location_optional,
            LocationRequirement::NotNeeded => self.forms.location_not_needed,
        }
    }

    pub fn is_transport_required(&self, category_id: &str) -> bool {
        self.transport.required.iter().any(|id| id == category_id)
    }

    pub fn transport_types(&self) -> &[TransportType] {
        &self.transport.types
    }

    pub fn transport_type(&self, key: &str) -> Result<&TransportType, CatalogError> {
        self.transport
            .types
            .iter()
            .find(|transport_type| transport_type.id == key)
            .ok_or_else(|| CatalogError::TransportTypeNotFound(key.to_string()))
    }

    pub fn sensitivity(&self, category_id: &str) -> SensitivityLevel {
        let listed = |list: &[String]| list.iter().any(|id| id == category_id);
        if listed(&self.sensitivity.high) {
            SensitivityLevel::High
        } else if listed(&self.sensitivity.medium) {
            SensitivityLevel::Medium
        } else {
            SensitivityLevel::Low
        }
    }

    pub fn is_anonymous_allowed(&self, category_id: &str) -> bool {
        self.anonymous
            .anonymous_allowed
            .iter()
            .any(|id| id == category_id)
    }

    pub fn is_identification_required(&self, category_id: &str) -> bool {
        self.anonymous
            .identification_required
            .iter()
            .any(|id| id == category_id)
    }

    pub fn should_show_on_public_map(&self, category_id: &str, has_location: bool) -> bool {
        if !self.form_configuration(category_id).show_on_public_map {
            return false;
        }
        if self.location_requirement(category_id) == LocationRequirement::Optional && !has_location
        {
            return false;
        }
        self.sensitivity(category_id) != SensitivityLevel::High
    }

    pub fn validate_location_data(
        &self,
        category_id: &str,
        has_location: bool,
        latitude: f64,
        longitude: f64,
    ) -> Result<(), LocationError> {
        if self.location_requirement(category_id) == LocationRequirement::Required && !has_location
        {
            return Err(LocationError::Required(category_id.to_string()));
        }

        if has_location {
            if latitude == 0.0 && longitude == 0.0 {
                return Err(LocationError::MissingCoordinates);
            }
            if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
                return Err(LocationError::OutOfRange);
            }
        }

        Ok(())
    }

    pub fn upload_policy(&self, category_id: &str) -> &UploadPolicy {
        self.uploads
            .categories
            .get(category_id)
            .unwrap_or(&self.uploads.default)
    }

    pub fn category_options(&self) -> Vec<SelectOption> {
        let mut options: Vec<SelectOption> = self
            .categories
            .iter()
            .map(|category| SelectOption {
                value: category.id.clone(),
                label: format!("{} {}", category.icon, category.name),
                description: category.description.clone(),
            })
            .collect();

        if self.settings.allow_other_subcategory {
            if let Some(other) = &self.other_category {
                options.push(SelectOption {
                    value: other.id.clone(),
                    label: format!("{} {}", other.icon, other.name),
                    description: other.description.clone(),
                });
            }
        }

        options
    }

    pub fn subcategory_options(&self, category_id: &str) -> Result<Vec<SelectOption>, CatalogError> {
        let category = self.category(category_id)?;
        Ok(category
            .subcategories
            .iter()
            .map(|sub| SelectOption {
                value: sub.id.clone(),
                label: sub.name.clone(),
                description: sub.description.clone(),
            })
            .collect())
    }

    pub fn category_name(&self, category_id: &str) -> String {
        self.category(category_id)
            .map(|category| category.name.clone())
            .unwrap_or_else(|_| UNKNOWN_CATEGORY_NAME.to_string())
    }

    pub fn subcategory_name(&self, category_id: &str, subcategory_id: &str) -> String {
        self.subcategory(category_id, subcategory_id)
            .map(|sub| sub.name.clone())
            .unwrap_or_else(|_| UNKNOWN_SUBCATEGORY_NAME.to_string())
    }

    pub fn full_category_path(&self, category_id: &str, subcategory_id: Option<&str>) -> String {
        let category_name = self.category_name(category_id);
        match subcategory_id.filter(|sub| !sub.is_empty()) {
            Some(sub) => format!("{} > {}", category_name, self.subcategory_name(category_id, sub)),
            None => category_name,
        }
    }

    pub fn categories_by_location(&self, requirement: LocationRequirement) -> Vec<&Category> {
        self.categories
            .iter()
            .filter(|category| self.location_requirement(&category.id) == requirement)
            .collect()
    }

    pub fn categories_by_sensitivity(&self, level: SensitivityLevel) -> Vec<&Category> {
        self.categories
            .iter()
            .filter(|category| self.sensitivity(&category.id) == level)
            .collect()
    }
}
