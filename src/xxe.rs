//! XML external entity (XXE) hardening.
//!
//! Stock engines fetch external DTDs and entities, which lets a document read
//! local files or reach the network. Every backend hardens a freshly created
//! engine or factory with [`harden`] unless its options opt out.
//!
//! Internal entities keep working, and DOCTYPE declarations stay legal.

use crate::config::XmlOptions;
use crate::xml::{Feature, FeatureConfigurable};

/// Features switched off by [`harden`].
pub const HARDENED_FEATURES: [Feature; 3] = [
    Feature::LoadExternalDtd,
    Feature::ExternalGeneralEntities,
    Feature::ExternalParameterEntities,
];

/// Switch off external DTD loading and external entity expansion.
///
/// Features the engine does not expose are logged and skipped; hardening
/// never fails.
pub fn harden<E>(engine: &mut E)
where
    E: FeatureConfigurable + ?Sized,
{
    for feature in HARDENED_FEATURES {
        if let Err(err) = engine.set_feature(feature, false) {
            log::debug!(
                "XXE hardening: skipping feature {} ({})",
                feature.uri(),
                err
            );
        }
    }
}

/// Harden `engine` unless `options` opt out.
pub(crate) fn apply<E>(engine: &mut E, options: &XmlOptions)
where
    E: FeatureConfigurable + ?Sized,
{
    if options.ignore_xxe_protections {
        log::debug!("XXE protections disabled; external entities will be resolved");
        return;
    }
    harden(engine);
}
