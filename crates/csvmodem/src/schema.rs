//! Type descriptions: which columns a row type has and how cells bind to it.
//!
//! A [`Schema`] is an ordered list of column members, each with a binding that
//! is either a setter on an existing instance or a constructor parameter, and
//! an instance provider. How a schema is produced (by hand, by a macro, by
//! generated code) makes no difference to the binder.

use std::{any::Any, fmt, str::FromStr, sync::Arc};

use crate::{
    error::{CellError, ConfigError},
    name_lookup::NameLookup,
};

/// How a member receives its value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum MemberKind {
    /// A setter on the instance.
    #[default]
    Property,
    /// Direct field assignment; bound like [`MemberKind::Property`].
    Field,
    /// A value staged until the instance is constructed.
    ConstructorParameter,
    /// A callback receiving the raw cell text.
    Delegate,
}

/// Per-member options.
///
/// ```rust
/// use csvmodem::MemberOptions;
///
/// let required = MemberOptions { required: true, ..Default::default() };
/// assert!(required.required);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemberOptions {
    /// A row that never supplies this member is rejected.
    ///
    /// # Default
    ///
    /// `false`
    pub required: bool,

    /// Informational for setter members, except that a setter declared as
    /// [`MemberKind::ConstructorParameter`] fails to build.
    /// [`SchemaBuilder::delegate`] and
    /// [`SchemaBuilder::constructor_parameter`] set it themselves.
    ///
    /// # Default
    ///
    /// [`MemberKind::Property`]
    pub kind: MemberKind,
}

/// A setter application postponed until the instance exists.
pub type DeferredSet<T> = Box<dyn FnOnce(&mut T) -> Result<(), CellError> + Send>;

type ApplyFn<T> = Arc<dyn Fn(&mut T, &str) -> Result<(), CellError> + Send + Sync>;
type DeferFn<T> = Arc<dyn Fn(&str) -> Result<DeferredSet<T>, CellError> + Send + Sync>;
type ParseFn = Arc<dyn Fn(&str) -> Result<Box<dyn Any + Send>, CellError> + Send + Sync>;
type BuildFn<T> = Arc<dyn Fn(&mut ConstructorArgs) -> Result<T, CellError> + Send + Sync>;

pub(crate) enum Binding<T> {
    Setter {
        /// Parses and sets in place.
        apply: ApplyFn<T>,
        /// Parses now, sets later.
        defer: DeferFn<T>,
    },
    Parameter {
        position: usize,
        parse: ParseFn,
    },
}

impl<T> Clone for Binding<T> {
    fn clone(&self) -> Self {
        match self {
            Binding::Setter { apply, defer } => Binding::Setter {
                apply: apply.clone(),
                defer: defer.clone(),
            },
            Binding::Parameter { position, parse } => Binding::Parameter {
                position: *position,
                parse: parse.clone(),
            },
        }
    }
}

/// One column of a row type.
pub struct ColumnMember<T> {
    pub(crate) name: Arc<str>,
    pub(crate) kind: MemberKind,
    pub(crate) required: bool,
    pub(crate) binding: Binding<T>,
}

impl<T> ColumnMember<T> {
    #[must_use]
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> MemberKind {
        self.kind
    }

    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required
    }
}

impl<T> Clone for ColumnMember<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            kind: self.kind,
            required: self.required,
            binding: self.binding.clone(),
        }
    }
}

impl<T> fmt::Debug for ColumnMember<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnMember")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("required", &self.required)
            .finish_non_exhaustive()
    }
}

pub(crate) enum InstanceProvider<T> {
    Default(Arc<dyn Fn() -> T + Send + Sync>),
    Constructor { arity: usize, build: BuildFn<T> },
}

impl<T> Clone for InstanceProvider<T> {
    fn clone(&self) -> Self {
        match self {
            InstanceProvider::Default(make) => InstanceProvider::Default(make.clone()),
            InstanceProvider::Constructor { arity, build } => InstanceProvider::Constructor {
                arity: *arity,
                build: build.clone(),
            },
        }
    }
}

/// Constructor arguments staged for one row, in parameter order.
#[derive(Default)]
pub struct ConstructorArgs {
    slots: Vec<Option<Box<dyn Any + Send>>>,
}

impl ConstructorArgs {
    pub(crate) fn with_arity(arity: usize) -> Self {
        let mut slots = Vec::with_capacity(arity);
        slots.resize_with(arity, || None);
        Self { slots }
    }

    pub(crate) fn stage(&mut self, position: usize, value: Box<dyn Any + Send>) {
        if let Some(slot) = self.slots.get_mut(position) {
            *slot = Some(value);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }

    /// Takes the value staged at `position`. `None` if no column supplied
    /// it or it was staged as a different type.
    pub fn take<V: 'static>(&mut self, position: usize) -> Option<V> {
        let value = self.slots.get_mut(position)?.take()?;
        value.downcast::<V>().ok().map(|value| *value)
    }

    /// [`take`](Self::take), falling back to `V::default()`.
    pub fn take_or_default<V: Default + 'static>(&mut self, position: usize) -> V {
        self.take(position).unwrap_or_default()
    }
}

impl fmt::Debug for ConstructorArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let staged: Vec<bool> = self.slots.iter().map(Option::is_some).collect();
        f.debug_struct("ConstructorArgs").field("staged", &staged).finish()
    }
}

/// Validated description of a row type `T`.
pub struct Schema<T> {
    pub(crate) members: Vec<ColumnMember<T>>,
    pub(crate) names: Arc<NameLookup>,
    pub(crate) provider: InstanceProvider<T>,
}

impl<T> Schema<T> {
    /// Members in declaration order.
    #[must_use]
    pub fn members(&self) -> &[ColumnMember<T>] {
        &self.members
    }

    /// Declaration index of the member called `name`.
    #[must_use]
    pub fn member_index(&self, name: &str) -> Option<usize> {
        self.names.try_lookup(name)
    }

    #[must_use]
    pub fn names(&self) -> &Arc<NameLookup> {
        &self.names
    }

    /// `false` when instances come from a constructor and cannot exist
    /// before all of a row's cells have been read.
    #[must_use]
    pub fn can_pre_allocate(&self) -> bool {
        matches!(self.provider, InstanceProvider::Default(_))
    }
}

impl<T> Clone for Schema<T> {
    fn clone(&self) -> Self {
        Self {
            members: self.members.clone(),
            names: self.names.clone(),
            provider: self.provider.clone(),
        }
    }
}

impl<T> fmt::Debug for Schema<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("members", &self.members)
            .field("can_pre_allocate", &self.can_pre_allocate())
            .finish_non_exhaustive()
    }
}

/// Produces the schema of `T`.
pub trait TypeDescriber<T> {
    /// # Errors
    ///
    /// Whatever [`SchemaBuilder::build`] reports.
    fn describe(&self) -> Result<Schema<T>, ConfigError>;
}

impl<T, F> TypeDescriber<T> for F
where
    F: Fn() -> Result<Schema<T>, ConfigError>,
{
    fn describe(&self) -> Result<Schema<T>, ConfigError> {
        self()
    }
}

/// Types that describe themselves.
pub trait Describe: Sized {
    /// # Errors
    ///
    /// Whatever [`SchemaBuilder::build`] reports.
    fn schema() -> Result<Schema<Self>, ConfigError>;
}

/// Builder for [`Schema`].
///
/// # Examples
///
/// ```rust
/// use csvmodem::{MemberOptions, SchemaBuilder};
///
/// #[derive(Debug, Default)]
/// struct Person {
///     name: String,
///     age: u32,
/// }
///
/// let schema = SchemaBuilder::<Person>::with_default()
///     .parsed("name", |p, v: String| p.name = v, MemberOptions { required: true, ..Default::default() })
///     .parsed("age", |p, v| p.age = v, MemberOptions::default())
///     .build()
///     .unwrap();
/// assert_eq!(schema.member_index("age"), Some(1));
/// ```
pub struct SchemaBuilder<T> {
    members: Vec<ColumnMember<T>>,
    provider: Option<InstanceProvider<T>>,
}

impl<T> Default for SchemaBuilder<T> {
    fn default() -> Self {
        Self {
            members: Vec::new(),
            provider: None,
        }
    }
}

impl<T: Default + 'static> SchemaBuilder<T> {
    /// A builder whose instances start as `T::default()`.
    #[must_use]
    pub fn with_default() -> Self {
        Self::new().default_instance(T::default)
    }
}

impl<T: 'static> SchemaBuilder<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Instances start as `make()` and members are set in place.
    #[must_use]
    pub fn default_instance(mut self, make: impl Fn() -> T + Send + Sync + 'static) -> Self {
        self.provider = Some(InstanceProvider::Default(Arc::new(make)));
        self
    }

    /// Instances are built by `build` once a row's cells are all read. It
    /// receives the values staged by the `arity` constructor parameters.
    #[must_use]
    pub fn constructor(
        mut self,
        arity: usize,
        build: impl Fn(&mut ConstructorArgs) -> Result<T, CellError> + Send + Sync + 'static,
    ) -> Self {
        self.provider = Some(InstanceProvider::Constructor {
            arity,
            build: Arc::new(build),
        });
        self
    }

    /// A member parsed by `parse` and stored by `set`.
    #[must_use]
    pub fn member<V, E, P, S>(self, name: &str, parse: P, set: S, options: MemberOptions) -> Self
    where
        V: Send + 'static,
        E: fmt::Display,
        P: Fn(&str) -> Result<V, E> + Send + Sync + 'static,
        S: Fn(&mut T, V) + Send + Sync + 'static,
    {
        let parse = Arc::new(parse);
        let set = Arc::new(set);
        let apply = {
            let (parse, set) = (parse.clone(), set.clone());
            Arc::new(move |target: &mut T, text: &str| -> Result<(), CellError> {
                let value = parse(text).map_err(CellError::new)?;
                set(target, value);
                Ok(())
            })
        };
        let defer = Arc::new(move |text: &str| -> Result<DeferredSet<T>, CellError> {
            let value = parse(text).map_err(CellError::new)?;
            let set = set.clone();
            let deferred: DeferredSet<T> = Box::new(move |target: &mut T| {
                set(target, value);
                Ok(())
            });
            Ok(deferred)
        });
        self.push(name, options, Binding::Setter { apply, defer })
    }

    /// A member parsed with [`FromStr`].
    #[must_use]
    pub fn parsed<V>(self, name: &str, set: impl Fn(&mut T, V) + Send + Sync + 'static, options: MemberOptions) -> Self
    where
        V: FromStr + Send + 'static,
        V::Err: fmt::Display,
    {
        self.member(name, V::from_str, set, options)
    }

    /// A member that receives the raw cell text.
    #[must_use]
    pub fn delegate(
        self,
        name: &str,
        receive: impl Fn(&mut T, &str) -> Result<(), CellError> + Send + Sync + 'static,
        options: MemberOptions,
    ) -> Self {
        let receive = Arc::new(receive);
        let apply = receive.clone();
        let defer = Arc::new(move |text: &str| -> Result<DeferredSet<T>, CellError> {
            let (receive, text) = (receive.clone(), text.to_owned());
            let deferred: DeferredSet<T> = Box::new(move |target: &mut T| receive(target, &text));
            Ok(deferred)
        });
        let options = MemberOptions {
            kind: MemberKind::Delegate,
            ..options
        };
        self.push(name, options, Binding::Setter { apply, defer })
    }

    /// A member passed to the constructor at `position`.
    #[must_use]
    pub fn constructor_parameter<V, E, P>(self, name: &str, position: usize, parse: P, options: MemberOptions) -> Self
    where
        V: Send + 'static,
        E: fmt::Display,
        P: Fn(&str) -> Result<V, E> + Send + Sync + 'static,
    {
        let parse: ParseFn = Arc::new(move |text: &str| -> Result<Box<dyn Any + Send>, CellError> {
            let value = parse(text).map_err(CellError::new)?;
            Ok(Box::new(value) as Box<dyn Any + Send>)
        });
        let options = MemberOptions {
            kind: MemberKind::ConstructorParameter,
            ..options
        };
        self.push(name, options, Binding::Parameter { position, parse })
    }

    /// A constructor parameter parsed with [`FromStr`].
    #[must_use]
    pub fn parsed_parameter<V>(self, name: &str, position: usize, options: MemberOptions) -> Self
    where
        V: FromStr + Send + 'static,
        V::Err: fmt::Display,
    {
        self.constructor_parameter(name, position, V::from_str, options)
    }

    fn push(mut self, name: &str, options: MemberOptions, binding: Binding<T>) -> Self {
        self.members.push(ColumnMember {
            name: name.into(),
            kind: options.kind,
            required: options.required,
            binding,
        });
        self
    }

    /// Validates the description.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::EmptyMemberName`] / [`ConfigError::DuplicateMember`]
    ///   for unusable names.
    /// - [`ConfigError::KindMismatch`] for a setter member declared as
    ///   [`MemberKind::ConstructorParameter`].
    /// - [`ConfigError::MissingInstanceProvider`] when neither
    ///   [`default_instance`](Self::default_instance) nor
    ///   [`constructor`](Self::constructor) was called.
    /// - [`ConfigError::ParameterWithoutConstructor`],
    ///   [`ConfigError::ParameterOutOfRange`] and
    ///   [`ConfigError::DuplicateParameter`] for constructor parameters that
    ///   do not fit the constructor.
    pub fn build(self) -> Result<Schema<T>, ConfigError> {
        let provider = self.provider.ok_or(ConfigError::MissingInstanceProvider)?;

        for (i, member) in self.members.iter().enumerate() {
            if member.name.is_empty() {
                return Err(ConfigError::EmptyMemberName);
            }
            if self.members[..i].iter().any(|other| other.name == member.name) {
                return Err(ConfigError::DuplicateMember(member.name.clone()));
            }
            if member.kind == MemberKind::ConstructorParameter && matches!(member.binding, Binding::Setter { .. }) {
                return Err(ConfigError::KindMismatch {
                    member: member.name.clone(),
                    kind: member.kind,
                });
            }
        }

        let positions: Vec<usize> = self
            .members
            .iter()
            .filter_map(|member| match member.binding {
                Binding::Parameter { position, .. } => Some(position),
                Binding::Setter { .. } => None,
            })
            .collect();
        match provider {
            InstanceProvider::Default(_) if !positions.is_empty() => {
                return Err(ConfigError::ParameterWithoutConstructor);
            }
            InstanceProvider::Constructor { arity, .. } => {
                for (i, &position) in positions.iter().enumerate() {
                    if position >= arity {
                        return Err(ConfigError::ParameterOutOfRange { position, arity });
                    }
                    if positions[..i].contains(&position) {
                        return Err(ConfigError::DuplicateParameter(position));
                    }
                }
            }
            InstanceProvider::Default(_) => {}
        }

        let names = Arc::new(NameLookup::new(self.members.iter().map(|m| &*m.name)));
        Ok(Schema {
            members: self.members,
            names,
            provider,
        })
    }
}
