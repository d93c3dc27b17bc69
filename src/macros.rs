/// Declares a closed set of wire names as a non-exhaustive enum.
///
/// Each variant is bound to the exact string the switch sends. The generated
/// code provides `ALL`, `as_str()`, exact-case `from_wire()`, `Display`,
/// `AsRef<str>`, a case-insensitive `FromStr` returning the caller's error
/// newtype, and serde impls that go through the wire name so the values can
/// appear in configuration files.
///
/// ```ignore
/// define_header_enum! {
///     error_type: ParseFooError,
///     /// Doc comment for the enum.
///     pub enum Foo {
///         Plain => "plain",
///         Fancy => "FANCY_ONE",
///     }
/// }
/// ```
macro_rules! define_header_enum {
    (
        error_type: $Err:ident,
        $(#[$enum_meta:meta])*
        $vis:vis enum $Name:ident {
            $(
                $(#[$var_meta:meta])*
                $variant:ident => $wire:literal
            ),+ $(,)?
        }
    ) => {
        $(#[$enum_meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[non_exhaustive]
        #[allow(missing_docs)]
        $vis enum $Name {
            $( $(#[$var_meta])* $variant, )+
        }

        impl $Name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$Name] = &[ $( $Name::$variant, )+ ];

            /// The name as it appears on the wire.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $( $Name::$variant => $wire, )+
                }
            }

            /// Exact-case lookup, as the switch spells it.
            pub fn from_wire(name: &str) -> Option<Self> {
                match name {
                    $( $wire => Some($Name::$variant), )+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $Name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl AsRef<str> for $Name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl std::str::FromStr for $Name {
            type Err = $Err;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(s))
                    .ok_or_else(|| $Err(s.to_string()))
            }
        }

        impl serde::Serialize for $Name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> serde::Deserialize<'de> for $Name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let name = <String as serde::Deserialize<'de>>::deserialize(deserializer)?;
                name.parse()
                    .map_err(serde::de::Error::custom)
            }
        }
    };
}
