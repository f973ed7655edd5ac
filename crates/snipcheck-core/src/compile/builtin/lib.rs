//! Standard library declarations, one chunk per language level.
//!
//! Chunks are ordinary declaration source parsed by the builtin parser on
//! first use. A unit sees every chunk at or below its profile target;
//! names and members from higher chunks produce the "change your target
//! library" diagnostics.

use std::sync::OnceLock;

use rustc_hash::FxHashMap;

use super::ast::{Program, StmtKind, TypeMember};
use super::parser::parse;
use crate::profile::Target;

/// Globals that exist at runtime but are not modeled: `any` as both a
/// value and a type.
pub const OPAQUE_GLOBALS: &[&str] = &[
    "ArrayBuffer",
    "SharedArrayBuffer",
    "DataView",
    "Int8Array",
    "Uint8Array",
    "Uint8ClampedArray",
    "Int16Array",
    "Uint16Array",
    "Int32Array",
    "Uint32Array",
    "Float32Array",
    "Float64Array",
    "BigInt64Array",
    "BigUint64Array",
    "Intl",
    "Atomics",
    "Generator",
    "AsyncGenerator",
    "AsyncIterable",
    "AsyncIterableIterator",
    "Iterator",
    "IteratorResult",
    "TemplateStringsArray",
    "PropertyDescriptor",
    "ThisType",
    "InstanceType",
    "ConstructorParameters",
    "Uppercase",
    "Lowercase",
    "Capitalize",
    "Uncapitalize",
    "ThisParameterType",
    "OmitThisParameter",
    "eval",
    "escape",
    "unescape",
];

/// Globals introduced after ES5, with the level that introduced them.
const GATED_GLOBALS: &[(&str, Target)] = &[
    ("Map", Target::Es2015),
    ("Set", Target::Es2015),
    ("WeakMap", Target::Es2015),
    ("WeakSet", Target::Es2015),
    ("Promise", Target::Es2015),
    ("Symbol", Target::Es2015),
    ("Reflect", Target::Es2015),
    ("Proxy", Target::Es2015),
    ("Iterable", Target::Es2015),
    ("IterableIterator", Target::Es2015),
    ("BigInt", Target::Es2020),
    ("globalThis", Target::Es2020),
    ("WeakRef", Target::Es2021),
    ("FinalizationRegistry", Target::Es2021),
];

const ES5: &str = r#"
declare var NaN: number;
declare var Infinity: number;
declare function parseInt(string: string, radix?: number): number;
declare function parseFloat(string: string): number;
declare function isNaN(number: number): boolean;
declare function isFinite(number: number): boolean;
declare function encodeURIComponent(uriComponent: string | number | boolean): string;
declare function decodeURIComponent(encodedURIComponent: string): string;
declare function encodeURI(uri: string): string;
declare function decodeURI(encodedURI: string): string;

interface Object {
    constructor: Function;
    toString(): string;
    toLocaleString(): string;
    valueOf(): Object;
    hasOwnProperty(v: string): boolean;
    isPrototypeOf(v: Object): boolean;
    propertyIsEnumerable(v: string): boolean;
}

interface ObjectConstructor {
    new (value?: any): Object;
    (value?: any): any;
    readonly prototype: Object;
    getPrototypeOf(o: any): any;
    getOwnPropertyNames(o: any): string[];
    create(o: object | null, properties?: any): any;
    defineProperty(o: any, p: string, attributes: any): any;
    freeze<T>(o: T): T;
    seal<T>(o: T): T;
    preventExtensions<T>(o: T): T;
    isFrozen(o: any): boolean;
    isSealed(o: any): boolean;
    keys(o: object): string[];
}
declare var Object: ObjectConstructor;

interface Function {
    apply(thisArg: any, argArray?: any): any;
    call(thisArg: any, ...argArray: any[]): any;
    bind(thisArg: any, ...argArray: any[]): any;
    toString(): string;
    prototype: any;
    readonly length: number;
}

interface FunctionConstructor {
    new (...args: string[]): Function;
    (...args: string[]): Function;
    readonly prototype: Function;
}
declare var Function: FunctionConstructor;

interface String {
    toString(): string;
    charAt(pos: number): string;
    charCodeAt(index: number): number;
    concat(...strings: string[]): string;
    indexOf(searchString: string, position?: number): number;
    lastIndexOf(searchString: string, position?: number): number;
    localeCompare(that: string): number;
    match(regexp: string | RegExp): RegExpMatchArray | null;
    replace(searchValue: string | RegExp, replaceValue: string | ((substring: string, ...args: any[]) => string)): string;
    search(regexp: string | RegExp): number;
    slice(start?: number, end?: number): string;
    split(separator: string | RegExp, limit?: number): string[];
    substring(start: number, end?: number): string;
    substr(from: number, length?: number): string;
    toLowerCase(): string;
    toLocaleLowerCase(locales?: string | string[]): string;
    toUpperCase(): string;
    toLocaleUpperCase(locales?: string | string[]): string;
    trim(): string;
    readonly length: number;
    valueOf(): string;
    readonly [index: number]: string;
}

interface StringConstructor {
    new (value?: any): String;
    (value?: any): string;
    readonly prototype: String;
    fromCharCode(...codes: number[]): string;
}
declare var String: StringConstructor;

interface Boolean {
    valueOf(): boolean;
}

interface BooleanConstructor {
    new (value?: any): Boolean;
    (value?: any): boolean;
    readonly prototype: Boolean;
}
declare var Boolean: BooleanConstructor;

interface Number {
    toString(radix?: number): string;
    toFixed(fractionDigits?: number): string;
    toExponential(fractionDigits?: number): string;
    toPrecision(precision?: number): string;
    toLocaleString(locales?: string | string[], options?: any): string;
    valueOf(): number;
}

interface NumberConstructor {
    new (value?: any): Number;
    (value?: any): number;
    readonly prototype: Number;
    readonly MAX_VALUE: number;
    readonly MIN_VALUE: number;
    readonly NaN: number;
    readonly NEGATIVE_INFINITY: number;
    readonly POSITIVE_INFINITY: number;
}
declare var Number: NumberConstructor;

interface Math {
    readonly E: number;
    readonly LN10: number;
    readonly LN2: number;
    readonly LOG2E: number;
    readonly LOG10E: number;
    readonly PI: number;
    readonly SQRT1_2: number;
    readonly SQRT2: number;
    abs(x: number): number;
    acos(x: number): number;
    asin(x: number): number;
    atan(x: number): number;
    atan2(y: number, x: number): number;
    ceil(x: number): number;
    cos(x: number): number;
    exp(x: number): number;
    floor(x: number): number;
    log(x: number): number;
    max(...values: number[]): number;
    min(...values: number[]): number;
    pow(x: number, y: number): number;
    random(): number;
    round(x: number): number;
    sin(x: number): number;
    sqrt(x: number): number;
    tan(x: number): number;
}
declare var Math: Math;

interface Date {
    toString(): string;
    toDateString(): string;
    toTimeString(): string;
    toLocaleString(locales?: string | string[], options?: any): string;
    toLocaleDateString(locales?: string | string[], options?: any): string;
    toLocaleTimeString(locales?: string | string[], options?: any): string;
    valueOf(): number;
    getTime(): number;
    getFullYear(): number;
    getUTCFullYear(): number;
    getMonth(): number;
    getUTCMonth(): number;
    getDate(): number;
    getUTCDate(): number;
    getDay(): number;
    getUTCDay(): number;
    getHours(): number;
    getUTCHours(): number;
    getMinutes(): number;
    getUTCMinutes(): number;
    getSeconds(): number;
    getUTCSeconds(): number;
    getMilliseconds(): number;
    getTimezoneOffset(): number;
    setTime(time: number): number;
    setMilliseconds(ms: number): number;
    setSeconds(sec: number, ms?: number): number;
    setMinutes(min: number, sec?: number, ms?: number): number;
    setHours(hours: number, min?: number, sec?: number, ms?: number): number;
    setDate(date: number): number;
    setMonth(month: number, date?: number): number;
    setFullYear(year: number, month?: number, date?: number): number;
    toUTCString(): string;
    toISOString(): string;
    toJSON(key?: any): string;
}

interface DateConstructor {
    new (): Date;
    new (value: number | string | Date): Date;
    new (year: number, monthIndex: number, date?: number, hours?: number, minutes?: number, seconds?: number, ms?: number): Date;
    (): string;
    readonly prototype: Date;
    parse(s: string): number;
    UTC(year: number, monthIndex?: number, date?: number, hours?: number, minutes?: number, seconds?: number, ms?: number): number;
    now(): number;
}
declare var Date: DateConstructor;

interface RegExpMatchArray extends Array<string> {
    index?: number;
    input?: string;
}

interface RegExpExecArray extends Array<string> {
    index: number;
    input: string;
}

interface RegExp {
    exec(string: string): RegExpExecArray | null;
    test(string: string): boolean;
    readonly source: string;
    readonly global: boolean;
    readonly ignoreCase: boolean;
    readonly multiline: boolean;
    lastIndex: number;
}

interface RegExpConstructor {
    new (pattern: RegExp | string, flags?: string): RegExp;
    (pattern: RegExp | string, flags?: string): RegExp;
    readonly prototype: RegExp;
}
declare var RegExp: RegExpConstructor;

interface Error {
    name: string;
    message: string;
    stack?: string;
}

interface ErrorConstructor {
    new (message?: string): Error;
    (message?: string): Error;
    readonly prototype: Error;
}
declare var Error: ErrorConstructor;
declare var TypeError: ErrorConstructor;
declare var RangeError: ErrorConstructor;
declare var SyntaxError: ErrorConstructor;
declare var ReferenceError: ErrorConstructor;
declare var EvalError: ErrorConstructor;
declare var URIError: ErrorConstructor;

interface JSON {
    parse(text: string, reviver?: (key: string, value: any) => any): any;
    stringify(value: any, replacer?: any, space?: string | number): string;
}
declare var JSON: JSON;

interface ArrayLike<T> {
    readonly length: number;
    readonly [n: number]: T;
}

interface Array<T> {
    length: number;
    toString(): string;
    toLocaleString(): string;
    pop(): T | undefined;
    push(...items: T[]): number;
    concat(...items: (T | T[])[]): T[];
    join(separator?: string): string;
    reverse(): T[];
    shift(): T | undefined;
    slice(start?: number, end?: number): T[];
    sort(compareFn?: (a: T, b: T) => number): T[];
    splice(start: number, deleteCount?: number, ...items: T[]): T[];
    unshift(...items: T[]): number;
    indexOf(searchElement: T, fromIndex?: number): number;
    lastIndexOf(searchElement: T, fromIndex?: number): number;
    every(predicate: (value: T, index: number, array: T[]) => unknown, thisArg?: any): boolean;
    some(predicate: (value: T, index: number, array: T[]) => unknown, thisArg?: any): boolean;
    forEach(callbackfn: (value: T, index: number, array: T[]) => void, thisArg?: any): void;
    map<U>(callbackfn: (value: T, index: number, array: T[]) => U, thisArg?: any): U[];
    filter(predicate: (value: T, index: number, array: T[]) => unknown, thisArg?: any): T[];
    reduce(callbackfn: (previousValue: T, currentValue: T, currentIndex: number, array: T[]) => T): T;
    reduce(callbackfn: (previousValue: T, currentValue: T, currentIndex: number, array: T[]) => T, initialValue: T): T;
    reduce<U>(callbackfn: (previousValue: U, currentValue: T, currentIndex: number, array: T[]) => U, initialValue: U): U;
    reduceRight(callbackfn: (previousValue: T, currentValue: T, currentIndex: number, array: T[]) => T): T;
    reduceRight(callbackfn: (previousValue: T, currentValue: T, currentIndex: number, array: T[]) => T, initialValue: T): T;
    reduceRight<U>(callbackfn: (previousValue: U, currentValue: T, currentIndex: number, array: T[]) => U, initialValue: U): U;
    [n: number]: T;
}

interface ArrayConstructor {
    new (arrayLength?: number): any[];
    new <T>(...items: T[]): T[];
    (arrayLength?: number): any[];
    <T>(...items: T[]): T[];
    isArray(arg: any): boolean;
    readonly prototype: any[];
}
declare var Array: ArrayConstructor;

type ReadonlyArray<T> = T[];
type PropertyKey = string | number | symbol;
"#;

const ES2015: &str = r#"
interface Iterable<T> {}

interface IterableIterator<T> {
    next(): { value: T; done?: boolean };
}

interface Array<T> {
    find(predicate: (value: T, index: number, obj: T[]) => unknown, thisArg?: any): T | undefined;
    findIndex(predicate: (value: T, index: number, obj: T[]) => unknown, thisArg?: any): number;
    fill(value: T, start?: number, end?: number): T[];
    copyWithin(target: number, start: number, end?: number): T[];
    keys(): IterableIterator<number>;
    values(): IterableIterator<T>;
    entries(): IterableIterator<[number, T]>;
}

interface ArrayConstructor {
    from(iterable: any): any[];
    from<T, U>(iterable: any, mapfn: (v: T, k: number) => U): U[];
    of<T>(...items: T[]): T[];
}

interface String {
    codePointAt(pos: number): number | undefined;
    includes(searchString: string, position?: number): boolean;
    endsWith(searchString: string, endPosition?: number): boolean;
    startsWith(searchString: string, position?: number): boolean;
    normalize(form?: string): string;
    repeat(count: number): string;
}

interface StringConstructor {
    fromCodePoint(...codePoints: number[]): string;
    raw(template: any, ...substitutions: any[]): string;
}

interface NumberConstructor {
    readonly EPSILON: number;
    readonly MAX_SAFE_INTEGER: number;
    readonly MIN_SAFE_INTEGER: number;
    isFinite(number: unknown): boolean;
    isInteger(number: unknown): boolean;
    isNaN(number: unknown): boolean;
    isSafeInteger(number: unknown): boolean;
    parseFloat(string: string): number;
    parseInt(string: string, radix?: number): number;
}

interface ObjectConstructor {
    assign(target: any, ...sources: any[]): any;
    getOwnPropertySymbols(o: any): symbol[];
    is(value1: any, value2: any): boolean;
    setPrototypeOf(o: any, proto: object | null): any;
}

interface Math {
    clz32(x: number): number;
    imul(x: number, y: number): number;
    sign(x: number): number;
    log10(x: number): number;
    log2(x: number): number;
    log1p(x: number): number;
    expm1(x: number): number;
    cosh(x: number): number;
    sinh(x: number): number;
    tanh(x: number): number;
    hypot(...values: number[]): number;
    trunc(x: number): number;
    fround(x: number): number;
    cbrt(x: number): number;
}

interface Function {
    readonly name: string;
}

interface Symbol {
    toString(): string;
    valueOf(): symbol;
}

interface SymbolConstructor {
    (description?: string | number): symbol;
    readonly prototype: Symbol;
    for(key: string): symbol;
    keyFor(sym: symbol): string | undefined;
    readonly iterator: symbol;
    readonly asyncIterator: symbol;
    readonly hasInstance: symbol;
    readonly toPrimitive: symbol;
    readonly toStringTag: symbol;
}
declare var Symbol: SymbolConstructor;

interface Map<K, V> {
    clear(): void;
    delete(key: K): boolean;
    forEach(callbackfn: (value: V, key: K, map: Map<K, V>) => void, thisArg?: any): void;
    get(key: K): V | undefined;
    has(key: K): boolean;
    set(key: K, value: V): Map<K, V>;
    readonly size: number;
    keys(): IterableIterator<K>;
    values(): IterableIterator<V>;
    entries(): IterableIterator<[K, V]>;
}

interface MapConstructor {
    new (): Map<any, any>;
    new <K, V>(entries?: any): Map<K, V>;
    readonly prototype: Map<any, any>;
}
declare var Map: MapConstructor;

interface WeakMap<K, V> {
    delete(key: K): boolean;
    get(key: K): V | undefined;
    has(key: K): boolean;
    set(key: K, value: V): WeakMap<K, V>;
}

interface WeakMapConstructor {
    new <K, V>(entries?: any): WeakMap<K, V>;
    readonly prototype: WeakMap<object, any>;
}
declare var WeakMap: WeakMapConstructor;

interface Set<T> {
    add(value: T): Set<T>;
    clear(): void;
    delete(value: T): boolean;
    forEach(callbackfn: (value: T, value2: T, set: Set<T>) => void, thisArg?: any): void;
    has(value: T): boolean;
    readonly size: number;
    keys(): IterableIterator<T>;
    values(): IterableIterator<T>;
    entries(): IterableIterator<[T, T]>;
}

interface SetConstructor {
    new <T>(values?: T[] | null): Set<T>;
    readonly prototype: Set<any>;
}
declare var Set: SetConstructor;

interface WeakSet<T> {
    add(value: T): WeakSet<T>;
    delete(value: T): boolean;
    has(value: T): boolean;
}

interface WeakSetConstructor {
    new <T>(values?: T[] | null): WeakSet<T>;
    readonly prototype: WeakSet<object>;
}
declare var WeakSet: WeakSetConstructor;

interface PromiseLike<T> {
    then<TResult1>(onfulfilled?: ((value: T) => TResult1 | PromiseLike<TResult1>) | null, onrejected?: ((reason: any) => any) | null): PromiseLike<TResult1>;
}

interface Promise<T> {
    then<TResult1>(onfulfilled?: ((value: T) => TResult1 | PromiseLike<TResult1>) | null, onrejected?: ((reason: any) => any) | null): Promise<TResult1>;
    catch<TResult>(onrejected?: ((reason: any) => TResult | PromiseLike<TResult>) | null): Promise<T | TResult>;
}

interface PromiseConstructor {
    new <T>(executor: (resolve: (value: T | PromiseLike<T>) => void, reject: (reason?: any) => void) => void): Promise<T>;
    readonly prototype: Promise<any>;
    all(values: any[]): Promise<any[]>;
    race(values: any[]): Promise<any>;
    reject(reason?: any): Promise<never>;
    resolve(): Promise<void>;
    resolve<T>(value: T | PromiseLike<T>): Promise<T>;
}
declare var Promise: PromiseConstructor;

declare var Reflect: any;
declare var Proxy: any;
"#;

const ES2016: &str = r#"
interface Array<T> {
    includes(searchElement: T, fromIndex?: number): boolean;
}
"#;

const ES2017: &str = r#"
interface ObjectConstructor {
    values(o: any): any[];
    entries(o: any): [string, any][];
    getOwnPropertyDescriptors(o: any): any;
}

interface String {
    padStart(maxLength: number, fillString?: string): string;
    padEnd(maxLength: number, fillString?: string): string;
}
"#;

const ES2018: &str = r#"
interface Promise<T> {
    finally(onfinally?: (() => void) | null): Promise<T>;
}
"#;

const ES2019: &str = r#"
interface Array<T> {
    flat(depth?: number): any[];
    flatMap<U>(callback: (value: T, index: number, array: T[]) => U | U[], thisArg?: any): U[];
}

interface ObjectConstructor {
    fromEntries(entries: any): any;
}

interface String {
    trimStart(): string;
    trimEnd(): string;
    trimLeft(): string;
    trimRight(): string;
}

interface Symbol {
    readonly description: string | undefined;
}
"#;

const ES2020: &str = r#"
interface String {
    matchAll(regexp: RegExp): IterableIterator<RegExpMatchArray>;
}

interface PromiseConstructor {
    allSettled(values: any[]): Promise<any[]>;
}

interface BigInt {
    toString(radix?: number): string;
    toLocaleString(locales?: string | string[], options?: any): string;
    valueOf(): bigint;
}

interface BigIntConstructor {
    (value: bigint | boolean | number | string): bigint;
    readonly prototype: BigInt;
    asIntN(bits: number, int: bigint): bigint;
    asUintN(bits: number, int: bigint): bigint;
}
declare var BigInt: BigIntConstructor;
declare var globalThis: any;
"#;

const ES2021: &str = r#"
interface String {
    replaceAll(searchValue: string | RegExp, replaceValue: string | ((substring: string, ...args: any[]) => string)): string;
}

interface PromiseConstructor {
    any(values: any[]): Promise<any>;
}

declare var WeakRef: any;
declare var FinalizationRegistry: any;
"#;

const ES2022: &str = r#"
interface Array<T> {
    at(index: number): T | undefined;
}

interface String {
    at(index: number): string | undefined;
}

interface ObjectConstructor {
    hasOwn(o: object, v: PropertyKey): boolean;
}

interface Error {
    cause?: unknown;
}
"#;

const CHUNKS: &[(Target, &str)] = &[
    (Target::Es5, ES5),
    (Target::Es2015, ES2015),
    (Target::Es2016, ES2016),
    (Target::Es2017, ES2017),
    (Target::Es2018, ES2018),
    (Target::Es2019, ES2019),
    (Target::Es2020, ES2020),
    (Target::Es2021, ES2021),
    (Target::Es2022, ES2022),
];

struct Library {
    chunks: Vec<(Target, Program)>,
    /// `(interface, member)` → level that introduced the member.
    members: FxHashMap<(String, String), Target>,
}

fn library() -> &'static Library {
    static LIBRARY: OnceLock<Library> = OnceLock::new();
    LIBRARY.get_or_init(|| {
        let mut chunks = Vec::with_capacity(CHUNKS.len());
        let mut members = FxHashMap::default();

        for (target, source) in CHUNKS {
            let (program, issues) = parse(source);
            if let Some(issue) = issues.first() {
                tracing::error!(
                    "builtin library chunk {} failed to parse at {}:{}: {}",
                    target,
                    issue.pos.line,
                    issue.pos.column,
                    issue.message
                );
            }
            for stmt in &program.body {
                if let StmtKind::Interface { name, members: list, .. } = &stmt.kind {
                    for member in list {
                        let member_name = match member {
                            TypeMember::Property { name, .. } | TypeMember::Method { name, .. } => name,
                            _ => continue,
                        };
                        members
                            .entry((name.text.clone(), member_name.clone()))
                            .or_insert(*target);
                    }
                }
            }
            chunks.push((*target, program));
        }

        Library { chunks, members }
    })
}

/// Library programs visible at `target`, lowest level first.
pub fn programs(target: Target) -> impl Iterator<Item = &'static Program> {
    library()
        .chunks
        .iter()
        .filter(move |(level, _)| *level <= target)
        .map(|(_, program)| program)
}

/// Level that introduced a gated global, when it is above `target`.
pub fn missing_global(name: &str, target: Target) -> Option<Target> {
    GATED_GLOBALS
        .iter()
        .find(|(global, _)| *global == name)
        .map(|(_, level)| *level)
        .filter(|level| *level > target)
}

/// Level that introduced `interface.member`, when it is above `target`.
pub fn missing_member(interface: &str, member: &str, target: Target) -> Option<Target> {
    library()
        .members
        .get(&(interface.to_string(), member.to_string()))
        .copied()
        .filter(|level| *level > target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunks_parse_cleanly() {
        for (target, source) in CHUNKS {
            let (_, issues) = parse(source);
            assert!(issues.is_empty(), "chunk {target} has syntax errors: {issues:?}");
        }
    }

    #[test]
    fn test_programs_follow_target() {
        assert_eq!(programs(Target::Es5).count(), 1);
        assert_eq!(programs(Target::Es2020).count(), 7);
        assert_eq!(programs(Target::EsNext).count(), CHUNKS.len());
    }

    #[test]
    fn test_gating() {
        assert_eq!(missing_global("Map", Target::Es5), Some(Target::Es2015));
        assert_eq!(missing_global("Map", Target::Es2015), None);
        assert_eq!(missing_global("parseInt", Target::Es5), None);
        assert_eq!(missing_member("Array", "includes", Target::Es2015), Some(Target::Es2016));
        assert_eq!(missing_member("Array", "push", Target::Es5), None);
        assert_eq!(missing_member("String", "padStart", Target::Es2022), None);
    }
}
