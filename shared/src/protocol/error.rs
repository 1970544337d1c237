use thiserror::Error;

/// Errors that can occur while composing profiles into a catalog
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// Two composed profiles declare the same action
    #[error("Feature {feature} of profile {profile} is already provided by profile {existing_profile}. Action names must be unique across composed profiles")]
    DuplicateFeature {
        feature: String,
        profile: String,
        existing_profile: String,
    },

    /// A profile with the same name was already composed
    #[error("Profile {profile} is already part of this catalog")]
    DuplicateProfile { profile: String },
}
