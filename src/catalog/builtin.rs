//! Built-in pure-component data.
//!
//! Antoine coefficients are for P_sat in mmHg with temperature in °C. Heat
//! capacity polynomials give ideal-gas Cp in J/(mol*K) with T in K.

use super::Component;

#[allow(clippy::too_many_arguments)]
fn record(
    id: &str,
    name: &str,
    formula: &str,
    cas_number: &str,
    molecular_weight: f64,
    critical: (f64, f64, f64, f64),
    antoine: [f64; 3],
    heat_capacity: [f64; 4],
    transitions: (f64, f64),
    heats: (f64, f64),
) -> Component {
    let (tc, pc, vc, omega) = critical;
    let (tb, tm) = transitions;
    let (hf, hvap) = heats;
    Component {
        id: id.to_string(),
        name: name.to_string(),
        formula: formula.to_string(),
        cas_number: cas_number.to_string(),
        molecular_weight,
        critical_temperature: Some(tc),
        critical_pressure: Some(pc),
        critical_volume: Some(vc),
        acentric_factor: Some(omega),
        antoine_coefficients: Some(antoine),
        heat_capacity_coefficients: Some(heat_capacity),
        normal_boiling_point: Some(tb),
        melting_point: Some(tm),
        heat_of_formation: Some(hf),
        heat_of_vaporization: Some(hvap),
        liquid_density_coefficients: None,
        viscosity_coefficients: None,
    }
}

/// Returns the built-in component records.
pub(super) fn components() -> Vec<Component> {
    let mut water = record(
        "water",
        "Water",
        "H2O",
        "7732-18-5",
        18.015,
        (647.1, 22.064e6, 0.056, 0.3449),
        [8.07131, 1730.63, 233.426],
        [33.596, -0.01191, 3.0669e-5, -3.502e-8],
        (373.15, 273.15),
        (-241_826.0, 40_660.0),
    );
    water.liquid_density_coefficients = Some(vec![5.459, 0.30542, 647.13, 0.081]);
    water.viscosity_coefficients = Some(vec![-52.843, 3703.6, 5.866, -5.88e-29, 10.0]);

    vec![
        water,
        record(
            "methanol",
            "Methanol",
            "CH3OH",
            "67-56-1",
            32.042,
            (512.5, 8.084e6, 0.117, 0.5625),
            [8.08097, 1582.271, 239.726],
            [21.15, 7.092e-2, 2.587e-5, -2.852e-8],
            (337.7, 175.2),
            (-200_660.0, 35_210.0),
        ),
        record(
            "ethanol",
            "Ethanol",
            "C2H5OH",
            "64-17-5",
            46.069,
            (513.9, 6.137e6, 0.168, 0.6436),
            [8.20417, 1642.89, 230.300],
            [9.014, 0.21379, -8.39e-5, 1.373e-9],
            (351.4, 159.0),
            (-234_810.0, 38_560.0),
        ),
        record(
            "methane",
            "Methane",
            "CH4",
            "74-82-8",
            16.043,
            (190.6, 4.599e6, 0.0986, 0.0115),
            [6.69561, 405.420, 267.777],
            [19.89, 5.024e-2, 1.269e-5, -1.1e-8],
            (111.7, 90.7),
            (-74_520.0, 8_180.0),
        ),
        record(
            "ethane",
            "Ethane",
            "C2H6",
            "74-84-0",
            30.070,
            (305.3, 4.872e6, 0.1455, 0.0995),
            [6.80266, 656.400, 256.998],
            [6.900, 0.17266, -6.406e-5, 7.285e-9],
            (184.6, 90.4),
            (-83_820.0, 14_690.0),
        ),
        record(
            "propane",
            "Propane",
            "C3H8",
            "74-98-6",
            44.097,
            (369.8, 4.248e6, 0.2, 0.1521),
            [6.82973, 803.810, 246.990],
            [-4.224, 0.30634, -1.586e-4, 3.215e-8],
            (231.1, 85.5),
            (-104_680.0, 18_770.0),
        ),
        record(
            "n_butane",
            "n-Butane",
            "C4H10",
            "106-97-8",
            58.124,
            (425.1, 3.796e6, 0.255, 0.2002),
            [6.83029, 945.910, 240.099],
            [9.487, 0.3313, -1.108e-4, -2.822e-9],
            (272.7, 134.9),
            (-125_790.0, 22_440.0),
        ),
        record(
            "benzene",
            "Benzene",
            "C6H6",
            "71-43-2",
            78.114,
            (562.1, 4.894e6, 0.259, 0.2103),
            [6.90565, 1211.033, 220.790],
            [-33.92, 0.4739, -3.017e-4, 7.13e-8],
            (353.2, 278.7),
            (82_880.0, 30_720.0),
        ),
        record(
            "toluene",
            "Toluene",
            "C7H8",
            "108-88-3",
            92.141,
            (591.8, 4.108e6, 0.316, 0.2657),
            [6.95087, 1342.310, 219.187],
            [-24.35, 0.5125, -2.765e-4, 4.911e-8],
            (383.8, 178.2),
            (50_170.0, 33_180.0),
        ),
        // Normal boiling point is the sublimation point
        record(
            "carbon_dioxide",
            "Carbon Dioxide",
            "CO2",
            "124-38-9",
            44.010,
            (304.1, 7.375e6, 0.094, 0.2276),
            [6.81228, 1301.679, 3.494],
            [22.26, 5.981e-2, -3.501e-5, 7.469e-9],
            (194.7, 216.6),
            (-393_520.0, 25_230.0),
        ),
        record(
            "carbon_monoxide",
            "Carbon Monoxide",
            "CO",
            "630-08-0",
            28.010,
            (132.9, 3.499e6, 0.093, 0.0497),
            [6.24677, 230.170, 260.000],
            [28.16, 0.00167, 5.372e-6, -2.222e-9],
            (81.7, 68.2),
            (-110_530.0, 6_040.0),
        ),
        record(
            "hydrogen",
            "Hydrogen",
            "H2",
            "1333-74-0",
            2.016,
            (33.2, 1.297e6, 0.065, -0.2156),
            [3.54314, 99.395, 7.726],
            [27.14, 9.274e-3, -1.381e-5, 7.645e-9],
            (20.4, 14.0),
            (0.0, 904.0),
        ),
        record(
            "nitrogen",
            "Nitrogen",
            "N2",
            "7727-37-9",
            28.014,
            (126.2, 3.398e6, 0.090, 0.0377),
            [6.49457, 255.68, 266.55],
            [28.98, -1.571e-3, 8.081e-6, -2.873e-9],
            (77.4, 63.2),
            (0.0, 5_577.0),
        ),
        record(
            "oxygen",
            "Oxygen",
            "O2",
            "7782-44-7",
            31.999,
            (154.6, 5.043e6, 0.073, 0.0222),
            [6.69147, 319.013, 266.697],
            [25.48, 1.520e-2, -7.155e-6, 1.312e-9],
            (90.2, 54.4),
            (0.0, 6_820.0),
        ),
        record(
            "acetone",
            "Acetone",
            "C3H6O",
            "67-64-1",
            58.080,
            (508.2, 4.7e6, 0.209, 0.3071),
            [7.11714, 1210.595, 229.664],
            [6.301, 0.2581, -1.516e-4, 3.636e-8],
            (329.4, 178.5),
            (-217_570.0, 29_100.0),
        ),
        record(
            "acetic_acid",
            "Acetic Acid",
            "C2H4O2",
            "64-19-7",
            60.053,
            (594.8, 5.786e6, 0.171, 0.4665),
            [7.38782, 1533.313, 222.309],
            [6.48, 0.2021, -1.221e-4, 2.867e-8],
            (391.1, 289.8),
            (-433_440.0, 23_700.0),
        ),
    ]
}
