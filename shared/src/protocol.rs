use std::{collections::HashMap, fmt, marker::PhantomData, sync::Arc};

use log::warn;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;

use crate::messages::payload::{Request, Response};

pub mod error;
pub use error::CatalogError;

// Feature

/// An action name together with its request/response schema pair.
///
/// `parse_request` and `parse_response` build fresh typed containers from the
/// raw JSON payload of a frame.
pub trait Feature: Send + Sync {
    fn name(&self) -> &str;

    fn parse_request(&self, raw: &Value) -> Result<Arc<dyn Request>, serde_json::Error>;

    fn parse_response(&self, raw: &Value) -> Result<Box<dyn Response>, serde_json::Error>;
}

/// [`Feature`] backed by a concrete request type `Q` and response type `S`
pub struct FeatureDef<Q, S> {
    name: &'static str,
    phantom: PhantomData<fn() -> (Q, S)>,
}

impl<Q, S> FeatureDef<Q, S> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            phantom: PhantomData,
        }
    }
}

impl<Q, S> Feature for FeatureDef<Q, S>
where
    Q: Request + DeserializeOwned,
    S: Response + DeserializeOwned,
{
    fn name(&self) -> &str {
        self.name
    }

    fn parse_request(&self, raw: &Value) -> Result<Arc<dyn Request>, serde_json::Error> {
        let request = <Q as Deserialize>::deserialize(raw)?;
        Ok(Arc::new(request))
    }

    fn parse_response(&self, raw: &Value) -> Result<Box<dyn Response>, serde_json::Error> {
        let response = <S as Deserialize>::deserialize(raw)?;
        Ok(Box::new(response))
    }
}

// Profile

/// A named bundle of features
#[derive(Clone)]
pub struct Profile {
    name: String,
    features: HashMap<String, Arc<dyn Feature>>,
}

impl Profile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            features: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a feature backed by the request type `Q` and its response `S`
    pub fn add_feature<Q, S>(&mut self, name: &'static str) -> &mut Self
    where
        Q: Request + DeserializeOwned,
        S: Response + DeserializeOwned,
    {
        self.add(Arc::new(FeatureDef::<Q, S>::new(name)))
    }

    pub fn add(&mut self, feature: Arc<dyn Feature>) -> &mut Self {
        let name = feature.name().to_string();
        if self.features.insert(name.clone(), feature).is_some() {
            warn!("Feature {} redefined in profile {}", name, self.name);
        }
        self
    }

    pub fn feature(&self, name: &str) -> Option<Arc<dyn Feature>> {
        self.features.get(name).cloned()
    }

    pub fn supports(&self, name: &str) -> bool {
        self.features.contains_key(name)
    }

    pub fn feature_names(&self) -> impl Iterator<Item = &str> {
        self.features.keys().map(String::as_str)
    }

    pub fn build(&mut self) -> Self {
        let name = self.name.clone();
        std::mem::replace(self, Profile::new(name))
    }
}

impl fmt::Debug for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.feature_names().collect();
        names.sort_unstable();
        f.debug_struct("Profile")
            .field("name", &self.name)
            .field("features", &names)
            .finish()
    }
}

// Catalog

/// The profiles composed by an endpoint, searchable by action
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    profiles: Vec<Profile>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Composes a profile. Rejects profiles whose actions collide with an
    /// already composed profile.
    pub fn add_profile(&mut self, profile: Profile) -> Result<&mut Self, CatalogError> {
        if self.profiles.iter().any(|existing| existing.name == profile.name) {
            return Err(CatalogError::DuplicateProfile {
                profile: profile.name,
            });
        }
        for feature in profile.feature_names() {
            if let Some(existing) = self.profile_for_feature(feature) {
                return Err(CatalogError::DuplicateFeature {
                    feature: feature.to_string(),
                    profile: profile.name.clone(),
                    existing_profile: existing.name.clone(),
                });
            }
        }
        self.profiles.push(profile);
        Ok(self)
    }

    pub fn lookup_by_action(&self, action: &str) -> Option<Arc<dyn Feature>> {
        self.profiles
            .iter()
            .find_map(|profile| profile.feature(action))
    }

    pub fn lookup_by_profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|profile| profile.name == name)
    }

    pub fn profile_for_feature(&self, action: &str) -> Option<&Profile> {
        self.profiles.iter().find(|profile| profile.supports(action))
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }
}
