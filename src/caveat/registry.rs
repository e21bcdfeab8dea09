//! global caveat type registry
//!
//! Decoding a token requires mapping wire type codes back to concrete
//! caveat types, and the JSON form maps stable string names the same way.
//! The registry is process-wide: built-in caveats are installed when it is
//! first touched, applications add their own types at startup with
//! [register_caveat_type], and it is read-only from then on. Registration
//! is idempotent and panics on conflicting re-registration to surface
//! misconfiguration at init time.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use crate::caveat::{
    BindToParentToken, Caveat, Caveat3P, CaveatType, IfPresent, ValidityWindow,
    CAV_BIND_TO_PARENT_TOKEN, CAV_IF_PRESENT, CAV_THIRD_PARTY, CAV_VALIDITY_WINDOW,
};
use crate::error::{Error, Format};

/// erased codec and comparison hooks for one registered caveat type
#[derive(Clone, Copy, Debug)]
pub(crate) struct CaveatVtable {
    pub(crate) name: &'static str,
    type_id: TypeId,
    pub(crate) to_value: fn(&dyn Caveat) -> Result<rmpv::Value, Format>,
    pub(crate) from_value: fn(&rmpv::Value) -> Result<Box<dyn Caveat>, Format>,
    pub(crate) to_json: fn(&dyn Caveat) -> Result<serde_json::Value, Format>,
    pub(crate) from_json: fn(serde_json::Value) -> Result<Box<dyn Caveat>, Format>,
    eq: fn(&dyn Caveat, &dyn Caveat) -> bool,
}

struct Registry {
    by_type: HashMap<u64, CaveatVtable>,
    by_name: HashMap<&'static str, u64>,
}

impl Registry {
    fn with_builtins() -> Self {
        let mut registry = Registry {
            by_type: HashMap::new(),
            by_name: HashMap::new(),
        };

        registry.register::<Caveat3P>("3P", CAV_THIRD_PARTY);
        registry.register::<BindToParentToken>("BindToParentToken", CAV_BIND_TO_PARENT_TOKEN);
        registry.register::<IfPresent>("IfPresent", CAV_IF_PRESENT);
        registry.register::<ValidityWindow>("ValidityWindow", CAV_VALIDITY_WINDOW);

        registry
    }

    fn register<C>(&mut self, name: &'static str, typ: CaveatType)
    where
        C: Caveat + PartialEq + Serialize + DeserializeOwned,
    {
        let vtable = CaveatVtable {
            name,
            type_id: TypeId::of::<C>(),
            to_value: to_value_impl::<C>,
            from_value: from_value_impl::<C>,
            to_json: to_json_impl::<C>,
            from_json: from_json_impl::<C>,
            eq: eq_impl::<C>,
        };

        if let Some(existing) = self.by_type.get(&typ.0) {
            if existing.type_id == vtable.type_id && existing.name == name {
                return;
            }
            panic!(
                "conflicting registration for caveat type {typ}: {} vs {name}",
                existing.name
            );
        }
        if let Some(code) = self.by_name.get(name) {
            panic!("caveat name {name} already registered with type {code}");
        }

        self.by_type.insert(typ.0, vtable);
        self.by_name.insert(name, typ.0);
    }
}

static REGISTRY: OnceLock<RwLock<Registry>> = OnceLock::new();

fn global() -> &'static RwLock<Registry> {
    REGISTRY.get_or_init(|| RwLock::new(Registry::with_builtins()))
}

/// registers a caveat type under a stable string name and integer code
///
/// Must be invoked before any token carrying the type is decoded.
/// Application codes start at [crate::CAV_MIN_USER_DEFINED]; lower codes
/// are reserved for built-in caveats. Re-registering the same type under
/// the same name and code is a no-op.
///
/// # Panics
///
/// Panics if the name or code is already registered for a different type.
pub fn register_caveat_type<C>(name: &'static str, typ: CaveatType)
where
    C: Caveat + PartialEq + Serialize + DeserializeOwned,
{
    global()
        .write()
        .expect("caveat registry lock poisoned")
        .register::<C>(name, typ);
}

pub(crate) fn lookup(typ: CaveatType) -> Result<CaveatVtable, Error> {
    global()
        .read()
        .expect("caveat registry lock poisoned")
        .by_type
        .get(&typ.0)
        .copied()
        .ok_or_else(|| Error::UnregisteredCaveat(typ.to_string()))
}

pub(crate) fn lookup_name(name: &str) -> Result<CaveatVtable, Error> {
    let registry = global().read().expect("caveat registry lock poisoned");
    registry
        .by_name
        .get(name)
        .and_then(|code| registry.by_type.get(code))
        .copied()
        .ok_or_else(|| Error::UnregisteredCaveat(name.to_string()))
}

/// structural equality between erased caveats, used for [crate::Macaroon::add]
/// dedup; caveats of unregistered types never compare equal
pub(crate) fn caveat_eq(a: &dyn Caveat, b: &dyn Caveat) -> bool {
    if a.caveat_type() != b.caveat_type() {
        return false;
    }
    match lookup(a.caveat_type()) {
        Ok(vtable) => (vtable.eq)(a, b),
        Err(_) => false,
    }
}

/// copies an erased caveat through its wire representation
pub(crate) fn clone_caveat(caveat: &dyn Caveat) -> Result<Box<dyn Caveat>, Error> {
    let vtable = lookup(caveat.caveat_type())?;
    let value = (vtable.to_value)(caveat)?;
    Ok((vtable.from_value)(&value)?)
}

fn downcast<C: Caveat>(caveat: &dyn Caveat) -> Result<&C, Format> {
    caveat
        .as_any()
        .downcast_ref::<C>()
        .ok_or_else(|| Format::SerializationError("caveat registered under wrong type".to_string()))
}

fn to_value_impl<C>(caveat: &dyn Caveat) -> Result<rmpv::Value, Format>
where
    C: Caveat + Serialize,
{
    let buf = rmp_serde::to_vec(downcast::<C>(caveat)?)
        .map_err(|e| Format::SerializationError(e.to_string()))?;
    let mut slice = buf.as_slice();
    rmpv::decode::read_value(&mut slice).map_err(|e| Format::SerializationError(e.to_string()))
}

fn from_value_impl<C>(value: &rmpv::Value) -> Result<Box<dyn Caveat>, Format>
where
    C: Caveat + DeserializeOwned,
{
    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, value)
        .map_err(|e| Format::DeserializationError(e.to_string()))?;
    let concrete: C =
        rmp_serde::from_slice(&buf).map_err(|e| Format::DeserializationError(e.to_string()))?;
    Ok(Box::new(concrete))
}

fn to_json_impl<C>(caveat: &dyn Caveat) -> Result<serde_json::Value, Format>
where
    C: Caveat + Serialize,
{
    serde_json::to_value(downcast::<C>(caveat)?)
        .map_err(|e| Format::SerializationError(e.to_string()))
}

fn from_json_impl<C>(value: serde_json::Value) -> Result<Box<dyn Caveat>, Format>
where
    C: Caveat + DeserializeOwned,
{
    let concrete: C =
        serde_json::from_value(value).map_err(|e| Format::DeserializationError(e.to_string()))?;
    Ok(Box::new(concrete))
}

fn eq_impl<C>(a: &dyn Caveat, b: &dyn Caveat) -> bool
where
    C: Caveat + PartialEq,
{
    match (a.as_any().downcast_ref::<C>(), b.as_any().downcast_ref::<C>()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Access;
    use serde::Deserialize;
    use std::any::Any;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Marker(u64);

    impl Caveat for Marker {
        fn caveat_type(&self) -> CaveatType {
            CaveatType(CAV_MIN_USER_DEFINED.0 + 900)
        }

        fn prohibits(&self, _access: &dyn Access) -> Result<(), Error> {
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    use crate::caveat::CAV_MIN_USER_DEFINED;

    #[test]
    fn builtins_are_registered() {
        assert_eq!(lookup(CAV_THIRD_PARTY).unwrap().name, "3P");
        assert_eq!(lookup_name("ValidityWindow").is_ok(), true);
        assert_eq!(lookup_name("IfPresent").is_ok(), true);
        assert_eq!(lookup_name("BindToParentToken").is_ok(), true);
    }

    #[test]
    fn unknown_type_errors() {
        let err = lookup(CaveatType(0xdead_beef)).unwrap_err();
        assert!(matches!(err, Error::UnregisteredCaveat(_)));
        assert!(matches!(
            lookup_name("NoSuchCaveat").unwrap_err(),
            Error::UnregisteredCaveat(_)
        ));
    }

    #[test]
    fn registration_is_idempotent() {
        register_caveat_type::<Marker>("Marker", CaveatType(CAV_MIN_USER_DEFINED.0 + 900));
        register_caveat_type::<Marker>("Marker", CaveatType(CAV_MIN_USER_DEFINED.0 + 900));
        assert_eq!(
            lookup(CaveatType(CAV_MIN_USER_DEFINED.0 + 900)).unwrap().name,
            "Marker"
        );
    }

    #[test]
    #[should_panic(expected = "conflicting registration")]
    fn conflicting_code_panics() {
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        struct Imposter;

        impl Caveat for Imposter {
            fn caveat_type(&self) -> CaveatType {
                CaveatType(CAV_MIN_USER_DEFINED.0 + 901)
            }

            fn prohibits(&self, _access: &dyn Access) -> Result<(), Error> {
                Ok(())
            }

            fn as_any(&self) -> &dyn Any {
                self
            }
        }

        register_caveat_type::<Marker>("MarkerA", CaveatType(CAV_MIN_USER_DEFINED.0 + 901));
        register_caveat_type::<Imposter>("MarkerB", CaveatType(CAV_MIN_USER_DEFINED.0 + 901));
    }

    #[test]
    fn erased_equality_and_clone() {
        register_caveat_type::<Marker>("Marker", CaveatType(CAV_MIN_USER_DEFINED.0 + 900));

        let a = Marker(7);
        let b = Marker(7);
        let c = Marker(8);
        assert!(caveat_eq(&a, &b));
        assert!(!caveat_eq(&a, &c));

        let window = ValidityWindow {
            not_before: 1,
            not_after: 2,
        };
        assert!(!caveat_eq(&a, &window));

        let cloned = clone_caveat(&a).unwrap();
        assert!(caveat_eq(&a, cloned.as_ref()));
    }
}
